//! Event-driven flows: registration, auto-wiring, topology changes and
//! queries arriving as broker payloads.

mod common;

use async_trait::async_trait;
use common::Harness;
use mov_core::{
    BasicFormat, Channel, ChannelName, ComponentRegistry, Error, PayloadSchema, Result,
    TopologyConfig,
};
use mov_topology::{
    events::channels, AsyncApiImporter, ConnectionFilter, ConnectionsPagePayload, Disposition,
};
use std::sync::Arc;

/// Importer over a `publish:<name>` / `subscribe:<name>` line format,
/// every channel typed as a string payload.
struct LineImporter;

#[async_trait]
impl AsyncApiImporter for LineImporter {
    async fn import(&self, yaml: &str) -> Result<Vec<Channel>> {
        let schema = PayloadSchema::basic(BasicFormat::String);
        yaml.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let (direction, name) = line
                    .split_once(':')
                    .ok_or_else(|| Error::import(format!("malformed line '{line}'")))?;
                let id = ChannelName::new(name.trim())
                    .map_err(|err| Error::import(err.to_string()))?;
                match direction.trim() {
                    "publish" => Channel::new(id, "", None, Some(schema.clone())),
                    "subscribe" => Channel::new(id, "", Some(schema.clone()), None),
                    other => Err(Error::import(format!("unknown direction '{other}'"))),
                }
            })
            .collect()
    }
}

async fn dispatch(
    dispatcher: &mov_topology::EventDispatcher,
    channel: &str,
    payload: serde_json::Value,
) -> Disposition {
    let channel = ChannelName::new(channel).unwrap();
    dispatcher.dispatch(&channel, payload.to_string().as_bytes()).await
}

#[tokio::test]
async fn registration_events_build_the_topology() {
    let harness = Harness::with_config(TopologyConfig { auto_apply: true, ..Default::default() });
    let dispatcher = harness.dispatcher(Arc::new(LineImporter));

    let camera = dispatch(
        &dispatcher,
        channels::REGISTER_COMPONENT,
        serde_json::json!({
            "type": "C0",
            "name": "c0_camera",
            "version": "1.0.0",
            "asyncapiYaml": "publish: valawai/c0/camera/data/frame",
        }),
    )
    .await;
    assert_eq!(camera, Disposition::Ack);

    let planner = dispatch(
        &dispatcher,
        channels::REGISTER_COMPONENT,
        serde_json::json!({
            "type": "C1",
            "name": "c1_planner",
            "version": "1.0.0",
            "asyncapiYaml": "subscribe: valawai/c1/planner/data/frame",
        }),
    )
    .await;
    assert_eq!(planner, Disposition::Ack);

    // Auto-wiring connected the compatible pair, enabled.
    let page = harness
        .engine
        .query_connections(&ConnectionFilter::default(), &[], 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let record = &page.connections[0];
    assert!(record.enabled);
    assert!(harness.engine.router().is_open(&record.source.channel_name));
}

#[tokio::test]
async fn unregistration_event_tears_the_component_down() {
    let harness = Harness::with_config(TopologyConfig { auto_apply: true, ..Default::default() });
    let dispatcher = harness.dispatcher(Arc::new(LineImporter));

    for (kind, name, yaml) in [
        ("C0", "c0_camera", "publish: cam/out"),
        ("C1", "c1_planner", "subscribe: planner/in"),
    ] {
        dispatch(
            &dispatcher,
            channels::REGISTER_COMPONENT,
            serde_json::json!({
                "type": kind, "name": name, "version": "1.0.0", "asyncapiYaml": yaml,
            }),
        )
        .await;
    }
    let (camera_id, _) = harness
        .registry
        .list()
        .await
        .into_iter()
        .find(|(_, component)| component.name == "c0_camera")
        .unwrap();

    let disposition = dispatch(
        &dispatcher,
        channels::UNREGISTER_COMPONENT,
        serde_json::json!({"componentId": camera_id}),
    )
    .await;
    assert_eq!(disposition, Disposition::Ack);

    assert!(harness.registry.find(camera_id).await.is_none());
    let page = harness
        .engine
        .query_connections(&ConnectionFilter::default(), &[], 0, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(!harness.engine.router().is_open(&ChannelName::new("cam/out").unwrap()));
}

#[tokio::test]
async fn query_event_pages_and_filters() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher(Arc::new(LineImporter));

    for i in 0..3 {
        let source = harness
            .register_publisher(&format!("c0_camera{i}"), &format!("cam{i}/out"))
            .await;
        let target = harness
            .register_subscriber(&format!("c1_planner{i}"), &format!("planner{i}/in"))
            .await;
        harness.engine.create_connection(source, target, false).await.unwrap();
    }

    let page_channel = harness.engine.config().page_channel.clone();
    let mut replies = harness.tap(&page_channel).await;

    let disposition = dispatch(
        &dispatcher,
        channels::QUERY_CONNECTIONS,
        serde_json::json!({
            "id": "q-7",
            "order": "sourceChannelName",
            "offset": 1,
            "limit": 1,
        }),
    )
    .await;
    assert_eq!(disposition, Disposition::Ack);

    let reply = replies.recv().await.unwrap();
    let page: ConnectionsPagePayload = serde_json::from_slice(&reply.payload).unwrap();
    assert_eq!(page.query_id, "q-7");
    assert_eq!(page.total, 3);
    assert_eq!(page.connections.len(), 1);
    assert_eq!(page.connections[0].source.channel_name.as_str(), "cam1/out");

    // Regex filter narrows the result.
    let disposition = dispatch(
        &dispatcher,
        channels::QUERY_CONNECTIONS,
        serde_json::json!({
            "id": "q-8",
            "sourceChannelName": "/cam2.*/",
        }),
    )
    .await;
    assert_eq!(disposition, Disposition::Ack);

    let reply = replies.recv().await.unwrap();
    let page: ConnectionsPagePayload = serde_json::from_slice(&reply.payload).unwrap();
    assert_eq!(page.query_id, "q-8");
    assert_eq!(page.total, 1);
    assert_eq!(page.connections[0].source.channel_name.as_str(), "cam2/out");
}

#[tokio::test]
async fn notification_events_round_trip() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher(Arc::new(LineImporter));

    let source = harness.register_publisher("c0_camera", "cam/out").await;
    let target = harness.register_subscriber("c1_planner", "planner/in").await;
    let observer = harness.register_subscriber("c2_observer", "observer/in").await;
    let record = harness.engine.create_connection(source, target, false).await.unwrap();

    let created = dispatch(
        &dispatcher,
        channels::CREATE_NOTIFICATION,
        serde_json::json!({
            "connectionId": record.id,
            "target": {
                "componentId": observer.component_id,
                "channelName": "observer/in",
            },
            "enabled": true,
        }),
    )
    .await;
    assert_eq!(created, Disposition::Ack);

    let stored = harness.engine.connection(record.id).await.unwrap().unwrap();
    assert_eq!(stored.notifications.len(), 1);
    assert!(stored.notifications[0].enabled);

    let removed = dispatch(
        &dispatcher,
        channels::CHANGE_NOTIFICATION,
        serde_json::json!({
            "connectionId": record.id,
            "target": {
                "componentId": observer.component_id,
                "channelName": "observer/in",
            },
            "action": "REMOVE",
        }),
    )
    .await;
    assert_eq!(removed, Disposition::Ack);
    let stored = harness.engine.connection(record.id).await.unwrap().unwrap();
    assert!(stored.notifications.is_empty());

    // Removing it again names a missing target: rejected, acknowledged.
    let again = dispatch(
        &dispatcher,
        channels::CHANGE_NOTIFICATION,
        serde_json::json!({
            "connectionId": record.id,
            "target": {
                "componentId": observer.component_id,
                "channelName": "observer/in",
            },
            "action": "REMOVE",
        }),
    )
    .await;
    assert_eq!(again, Disposition::Ack);
}
