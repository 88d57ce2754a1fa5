//! Inbound RPC envelopes.
//!
//! Every inbound message is a JSON object naming its target node and its
//! type tag. The remaining fields depend on the tag. A batch is either an
//! array of such objects or a single one.

use crate::error::{ProtocolError, ProtocolResult};
use serde_json::{json, Map};
use statesync_codec::{from_json, Value};
use statesync_core::{AttachResponse, NodeId};

/// Field names used by inbound messages.
pub mod keys {
    /// Type tag.
    pub const TYPE: &str = "type";
    /// Target node id.
    pub const NODE: &str = "node";
    /// Event type of an event message.
    pub const EVENT: &str = "event";
    /// Event data of an event message.
    pub const DATA: &str = "data";
    /// Property name of a property sync.
    pub const PROPERTY: &str = "property";
    /// Property value of a property sync.
    pub const VALUE: &str = "value";
    /// Method name of a template method invocation.
    pub const METHOD_NAME: &str = "templateEventMethodName";
    /// Arguments of a template method invocation.
    pub const METHOD_ARGS: &str = "templateEventMethodArgs";
    /// Placeholder id of an attach answer.
    pub const ATTACH_REQUESTED: &str = "attachReqId";
    /// Bound id of an attach answer.
    pub const ATTACH_ASSIGNED: &str = "attachAssignedId";
    /// Element tag of an attach answer.
    pub const ATTACH_TAG: &str = "attachTagName";
    /// Element position of an attach answer.
    pub const ATTACH_INDEX: &str = "attachIndex";
    /// Marker of a node reference inside a value.
    pub const NODE_REF: &str = "@v-node";
}

/// Type tags of inbound messages.
pub mod tags {
    /// A DOM event fired on the client.
    pub const EVENT: &str = "event";
    /// A property changed on the client.
    pub const PROPERTY_SYNC: &str = "mSync";
    /// A published server method called from the client.
    pub const TEMPLATE_METHOD: &str = "publishedEventHandler";
    /// The answer to an attach-existing request.
    pub const ATTACH_EXISTING: &str = "attachExistingElement";
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEnvelope {
    /// Target node.
    pub node: NodeId,
    /// Type tag.
    pub rpc_type: String,
    /// All other fields.
    pub payload: Map<String, serde_json::Value>,
}

impl RpcEnvelope {
    /// Creates an envelope with an empty payload.
    pub fn new(node: NodeId, rpc_type: impl Into<String>) -> Self {
        Self {
            node,
            rpc_type: rpc_type.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    pub fn with_field(mut self, name: &str, value: serde_json::Value) -> Self {
        self.payload.insert(name.to_string(), value);
        self
    }

    /// Decodes an envelope from a JSON object.
    pub fn from_json(json: &serde_json::Value) -> ProtocolResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("envelope is not an object"))?;
        let node = object
            .get(keys::NODE)
            .and_then(serde_json::Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or(ProtocolError::MissingField { field: keys::NODE })?;
        let rpc_type = object
            .get(keys::TYPE)
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingField { field: keys::TYPE })?
            .to_string();
        let payload = object
            .iter()
            .filter(|(name, _)| name.as_str() != keys::NODE && name.as_str() != keys::TYPE)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(Self {
            node: NodeId(node),
            rpc_type,
            payload,
        })
    }

    /// Encodes the envelope as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = Map::new();
        object.insert(keys::NODE.to_string(), json!(self.node.as_u32()));
        object.insert(keys::TYPE.to_string(), json!(self.rpc_type));
        for (name, value) in &self.payload {
            object.insert(name.clone(), value.clone());
        }
        serde_json::Value::Object(object)
    }

    /// A payload field.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }

    fn required(&self, field: &'static str) -> ProtocolResult<&serde_json::Value> {
        self.payload.get(field).ok_or(ProtocolError::MissingField { field })
    }

    fn required_str(&self, field: &'static str) -> ProtocolResult<&str> {
        self.required(field)?
            .as_str()
            .ok_or(ProtocolError::MissingField { field })
    }

    fn required_i64(&self, field: &'static str) -> ProtocolResult<i64> {
        self.required(field)?
            .as_i64()
            .ok_or(ProtocolError::MissingField { field })
    }
}

/// Splits inbound text into raw messages.
///
/// Each element is decoded on its own so that one malformed message does not
/// hide the others.
pub fn decode_batch(text: &str) -> ProtocolResult<Vec<serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Array(items) => Ok(items),
        object @ serde_json::Value::Object(_) => Ok(vec![object]),
        other => Err(ProtocolError::malformed(format!(
            "expected an array or an object, got {other}"
        ))),
    }
}

/// Payload of an `event` message.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    /// Event type.
    pub event_type: String,
    /// Event data, an empty map when absent.
    pub data: Value,
}

impl EventPayload {
    /// Reads the payload of `envelope`.
    pub fn from_envelope(envelope: &RpcEnvelope) -> ProtocolResult<Self> {
        let event_type = envelope.required_str(keys::EVENT)?.to_string();
        let data = match envelope.field(keys::DATA) {
            None | Some(serde_json::Value::Null) => Value::Map(Default::default()),
            Some(data @ serde_json::Value::Object(_)) => from_json(data)?,
            Some(_) => return Err(ProtocolError::MissingField { field: keys::DATA }),
        };
        Ok(Self { event_type, data })
    }
}

/// A value received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundValue {
    /// A plain value.
    Value(Value),
    /// A reference to another node.
    Node(NodeId),
}

impl InboundValue {
    /// Reads a value, recognizing `{"@v-node": id}` references.
    pub fn from_json(json: &serde_json::Value) -> ProtocolResult<Self> {
        if let Some(object) = json.as_object() {
            if let Some(reference) = object.get(keys::NODE_REF) {
                let id = reference
                    .as_u64()
                    .and_then(|id| u32::try_from(id).ok())
                    .ok_or(ProtocolError::MissingField {
                        field: keys::NODE_REF,
                    })?;
                return Ok(InboundValue::Node(NodeId(id)));
            }
        }
        Ok(InboundValue::Value(from_json(json)?))
    }
}

/// Payload of an `mSync` message.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySyncPayload {
    /// Property name.
    pub property: String,
    /// New value.
    pub value: InboundValue,
}

impl PropertySyncPayload {
    /// Reads the payload of `envelope`.
    pub fn from_envelope(envelope: &RpcEnvelope) -> ProtocolResult<Self> {
        Ok(Self {
            property: envelope.required_str(keys::PROPERTY)?.to_string(),
            value: InboundValue::from_json(envelope.required(keys::VALUE)?)?,
        })
    }
}

/// Payload of a `publishedEventHandler` message.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInvokePayload {
    /// Method name.
    pub method: String,
    /// Arguments, possibly node references.
    pub args: Vec<InboundValue>,
}

impl MethodInvokePayload {
    /// Reads the payload of `envelope`.
    pub fn from_envelope(envelope: &RpcEnvelope) -> ProtocolResult<Self> {
        let method = envelope.required_str(keys::METHOD_NAME)?.to_string();
        let args = match envelope.field(keys::METHOD_ARGS) {
            None => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(InboundValue::from_json)
                .collect::<ProtocolResult<_>>()?,
            Some(_) => {
                return Err(ProtocolError::MissingField {
                    field: keys::METHOD_ARGS,
                })
            }
        };
        Ok(Self { method, args })
    }
}

/// Payload of an `attachExistingElement` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachExistingPayload {
    /// Placeholder id.
    pub requested: NodeId,
    /// Bound node id, `-1` when not found.
    pub assigned: i64,
    /// Tag of the element found.
    pub tag: String,
    /// Position of the element among its siblings.
    pub index: Option<usize>,
}

impl AttachExistingPayload {
    /// Reads the payload of `envelope`.
    pub fn from_envelope(envelope: &RpcEnvelope) -> ProtocolResult<Self> {
        let requested = u32::try_from(envelope.required_i64(keys::ATTACH_REQUESTED)?).map_err(
            |_| ProtocolError::MissingField {
                field: keys::ATTACH_REQUESTED,
            },
        )?;
        let index = match envelope.field(keys::ATTACH_INDEX) {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(index) if index < 0 => None,
                Some(index) => usize::try_from(index).ok(),
                None => {
                    return Err(ProtocolError::MissingField {
                        field: keys::ATTACH_INDEX,
                    })
                }
            },
        };
        Ok(Self {
            requested: NodeId(requested),
            assigned: envelope.required_i64(keys::ATTACH_ASSIGNED)?,
            tag: envelope.required_str(keys::ATTACH_TAG)?.to_string(),
            index,
        })
    }

    /// The answer in the form the tree consumes.
    pub fn into_response(self) -> AttachResponse {
        AttachResponse {
            requested: self.requested,
            assigned: self.assigned,
            tag: self.tag,
            index: self.index,
        }
    }
}

/// Builds an `event` envelope.
pub fn event(node: NodeId, event_type: &str, data: serde_json::Value) -> RpcEnvelope {
    RpcEnvelope::new(node, tags::EVENT)
        .with_field(keys::EVENT, json!(event_type))
        .with_field(keys::DATA, data)
}

/// Builds an `mSync` envelope.
pub fn property_sync(node: NodeId, property: &str, value: serde_json::Value) -> RpcEnvelope {
    RpcEnvelope::new(node, tags::PROPERTY_SYNC)
        .with_field(keys::PROPERTY, json!(property))
        .with_field(keys::VALUE, value)
}

/// Builds a `publishedEventHandler` envelope.
pub fn method_invoke(node: NodeId, method: &str, args: Vec<serde_json::Value>) -> RpcEnvelope {
    RpcEnvelope::new(node, tags::TEMPLATE_METHOD)
        .with_field(keys::METHOD_NAME, json!(method))
        .with_field(keys::METHOD_ARGS, serde_json::Value::Array(args))
}

/// Builds an `attachExistingElement` envelope.
pub fn attach_existing(
    node: NodeId,
    requested: NodeId,
    assigned: i64,
    tag: &str,
    index: i64,
) -> RpcEnvelope {
    RpcEnvelope::new(node, tags::ATTACH_EXISTING)
        .with_field(keys::ATTACH_REQUESTED, json!(requested.as_u32()))
        .with_field(keys::ATTACH_ASSIGNED, json!(assigned))
        .with_field(keys::ATTACH_TAG, json!(tag))
        .with_field(keys::ATTACH_INDEX, json!(index))
}

/// A JSON reference to `node`.
pub fn node_ref(node: NodeId) -> serde_json::Value {
    let mut object = Map::new();
    object.insert(keys::NODE_REF.to_string(), json!(node.as_u32()));
    serde_json::Value::Object(object)
}

/// Encodes envelopes as a batch text.
pub fn encode_batch(envelopes: &[RpcEnvelope]) -> ProtocolResult<String> {
    let items: Vec<serde_json::Value> = envelopes.iter().map(RpcEnvelope::to_json).collect();
    Ok(serde_json::to_string(&items)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_splits_header_from_payload() {
        let json = json!({"node": 4, "type": "event", "event": "click"});
        let envelope = RpcEnvelope::from_json(&json).unwrap();
        assert_eq!(envelope.node, NodeId(4));
        assert_eq!(envelope.rpc_type, "event");
        assert_eq!(envelope.payload.len(), 1);
        assert_eq!(envelope.to_json(), json);
    }

    #[test]
    fn envelope_errors() {
        assert!(matches!(
            RpcEnvelope::from_json(&json!({"type": "event"})),
            Err(ProtocolError::MissingField { field: "node" })
        ));
        assert!(matches!(
            RpcEnvelope::from_json(&json!({"node": -1, "type": "event"})),
            Err(ProtocolError::MissingField { field: "node" })
        ));
        assert!(matches!(
            RpcEnvelope::from_json(&json!({"node": 1})),
            Err(ProtocolError::MissingField { field: "type" })
        ));
        assert!(RpcEnvelope::from_json(&json!([1])).unwrap_err().is_structural());
    }

    #[test]
    fn batch_accepts_array_or_single_object() {
        assert_eq!(decode_batch(r#"[{"node":1},{"node":2}]"#).unwrap().len(), 2);
        assert_eq!(decode_batch(r#"{"node":1,"type":"event"}"#).unwrap().len(), 1);
        assert!(decode_batch("3").is_err());
        assert!(decode_batch("{").is_err());
    }

    #[test]
    fn event_data_defaults_to_empty_map() {
        let message = json!({"node": 1, "type": "event", "event": "click"});
        let envelope = RpcEnvelope::from_json(&message).unwrap();
        let payload = EventPayload::from_envelope(&envelope).unwrap();
        assert_eq!(payload.event_type, "click");
        assert_eq!(payload.data, Value::Map(Default::default()));

        let envelope = event(NodeId(1), "keydown", json!({"key": "a"}));
        let payload = EventPayload::from_envelope(&envelope).unwrap();
        assert_eq!(payload.data.get("key"), Some(&Value::from("a")));
    }

    #[test]
    fn property_sync_recognizes_node_refs() {
        let envelope = property_sync(NodeId(2), "model", node_ref(NodeId(7)));
        let payload = PropertySyncPayload::from_envelope(&envelope).unwrap();
        assert_eq!(payload.property, "model");
        assert_eq!(payload.value, InboundValue::Node(NodeId(7)));

        let envelope = property_sync(NodeId(2), "value", json!({"bar": "baz"}));
        let payload = PropertySyncPayload::from_envelope(&envelope).unwrap();
        assert_eq!(
            payload.value,
            InboundValue::Value(Value::map([("bar", Value::from("baz"))]))
        );

        let envelope =
            RpcEnvelope::new(NodeId(2), tags::PROPERTY_SYNC).with_field(keys::PROPERTY, json!("x"));
        assert!(matches!(
            PropertySyncPayload::from_envelope(&envelope),
            Err(ProtocolError::MissingField { field: "value" })
        ));
    }

    #[test]
    fn method_args_may_hold_node_refs() {
        let envelope = method_invoke(NodeId(1), "select", vec![json!(3), node_ref(NodeId(5))]);
        let payload = MethodInvokePayload::from_envelope(&envelope).unwrap();
        assert_eq!(payload.method, "select");
        assert_eq!(
            payload.args,
            vec![InboundValue::Value(Value::Integer(3)), InboundValue::Node(NodeId(5))]
        );
    }

    #[test]
    fn attach_payload_reads_not_found() {
        let envelope = attach_existing(NodeId(1), NodeId(6), -1, "span", -1);
        let payload = AttachExistingPayload::from_envelope(&envelope).unwrap();
        assert_eq!(payload.requested, NodeId(6));
        assert_eq!(payload.assigned, -1);
        assert_eq!(payload.index, None);

        let envelope = attach_existing(NodeId(1), NodeId(6), 6, "span", 2);
        let response = AttachExistingPayload::from_envelope(&envelope)
            .unwrap()
            .into_response();
        assert_eq!(response.index, Some(2));
        assert_eq!(response.tag, "span");
    }

    #[test]
    fn encode_batch_round_trips() {
        let batch = vec![
            event(NodeId(1), "click", json!({})),
            property_sync(NodeId(2), "v", json!(1)),
        ];
        let text = encode_batch(&batch).unwrap();
        let decoded: Vec<RpcEnvelope> = decode_batch(&text)
            .unwrap()
            .iter()
            .map(|item| RpcEnvelope::from_json(item).unwrap())
            .collect();
        assert_eq!(decoded, batch);
    }
}
