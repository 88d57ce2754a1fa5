//! Demo command implementation.
//!
//! Runs small sessions end to end and prints each payload they produce.

use statesync_core::{FeatureKind, PropertyValue, StateTree};
use statesync_engine::{DiffTransport, Loopback, Session, SessionConfig};
use statesync_protocol::{rpc, EncodedPayload};

type DemoResult<T> = Result<T, Box<dyn std::error::Error>>;

/// What one scenario sent, and what it showed.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Scenario title.
    pub title: &'static str,
    /// Payloads in send order.
    pub payloads: Vec<EncodedPayload>,
    /// One-line summary of the outcome.
    pub summary: String,
}

/// Runs the demo command.
pub fn run() -> DemoResult<()> {
    for report in scenarios()? {
        println!("== {}", report.title);
        for payload in &report.payloads {
            println!("{}", payload.to_json()?);
        }
        println!("-> {}", report.summary);
        println!();
    }
    Ok(())
}

/// Runs every scenario.
pub fn scenarios() -> DemoResult<Vec<ScenarioReport>> {
    Ok(vec![repeated_writes()?, transient_child()?, property_sync_copy()?])
}

fn repeated_writes() -> DemoResult<ScenarioReport> {
    let session = Session::new(SessionConfig::default());
    let root = session.with_tree(|tree| -> DemoResult<_> {
        let root = tree.create_node(&[FeatureKind::Properties])?;
        tree.set_property(root, "value", 0.0)?;
        tree.attach_root(root)?;
        Ok(root)
    })?;
    let mut payloads = Vec::new();
    payloads.extend(session.flush().payload);

    session.with_tree(|tree| -> DemoResult<()> {
        tree.set_property(root, "value", 1.0)?;
        tree.set_property(root, "value", 1.0)?;
        Ok(())
    })?;
    let second = session.flush();
    payloads.extend(second.payload);

    Ok(ScenarioReport {
        title: "repeated writes collapse",
        payloads,
        summary: format!(
            "{} raw records optimized to {}",
            second.stats.raw_records, second.stats.optimized_records
        ),
    })
}

fn transient_child() -> DemoResult<ScenarioReport> {
    let session = Session::new(SessionConfig::default());
    let root = session.with_tree(|tree| -> DemoResult<_> {
        let root = tree.create_element("body");
        tree.attach_root(root)?;
        Ok(root)
    })?;
    let mut payloads = Vec::new();
    payloads.extend(session.flush().payload);

    session.with_tree(|tree| -> DemoResult<()> {
        let child = tree.create_element("span");
        tree.insert_child(root, 0, child)?;
        tree.remove_child(root, 0)?;
        Ok(())
    })?;
    let second = session.flush();
    let summary = match &second.payload {
        Some(payload) => format!("{} changes sent for the transient child", payload.len()),
        None => "nothing sent for the transient child".to_string(),
    };
    payloads.extend(second.payload);

    Ok(ScenarioReport {
        title: "child inserted and removed between flushes",
        payloads,
        summary,
    })
}

fn property_sync_copy() -> DemoResult<ScenarioReport> {
    let session = Session::new(SessionConfig::default());
    let client = Loopback::new();
    let (root, root_id, source, source_id) = session.with_tree(|tree| -> DemoResult<_> {
        let root = tree.create_element("body");
        tree.attach_root(root)?;
        let source = tree.create_element("div");
        tree.set_property(source, "bar", "baz")?;
        tree.append_child(root, source)?;
        let root_id = tree.node_id(root).ok_or("root has no id")?;
        let source_id = tree.node_id(source).ok_or("source has no id")?;
        Ok((root, root_id, source, source_id))
    })?;
    let mut payloads = Vec::new();
    flush_into(&session, &client, &mut payloads)?;

    let sync = rpc::property_sync(root_id, "model", rpc::node_ref(source_id));
    let batch = rpc::encode_batch(&[sync])?;
    session.handle_invocations(&batch)?;
    let independent = session.with_tree(|tree| -> DemoResult<bool> {
        tree.set_property(source, "bar", "changed")?;
        let copy = tree
            .property(root, "model")?
            .and_then(PropertyValue::as_node)
            .ok_or("model is not a node")?;
        Ok(copy != source && copy_text(tree, copy)? == Some("baz".to_string()))
    })?;
    flush_into(&session, &client, &mut payloads)?;

    Ok(ScenarioReport {
        title: "property sync copies the referenced node",
        payloads,
        summary: format!(
            "copy independent of source: {}, client document: {}",
            independent,
            client.render()
        ),
    })
}

fn flush_into(
    session: &Session,
    client: &Loopback,
    payloads: &mut Vec<EncodedPayload>,
) -> DemoResult<()> {
    if let Some(payload) = session.flush().payload {
        client.send(&payload)?;
        payloads.push(payload);
    }
    Ok(())
}

fn copy_text(tree: &StateTree, node: statesync_core::NodeKey) -> DemoResult<Option<String>> {
    Ok(match tree.property(node, "bar")? {
        Some(PropertyValue::Value(value)) => value.as_text().map(str::to_string),
        _ => None,
    })
}
