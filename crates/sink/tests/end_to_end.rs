//! Console-only run: scripted watch streams through the supervisor and pipeline.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{stream, StreamExt};
use kubewatch_kubehub::{Change, ChangeStream, ResourceDescriptor, ResourceRegistry, WatchSource, WatchSupervisor, WatchedObject};
use kubewatch_sink::{ConsoleSink, FailurePolicy, Fanout, OutputMode, Pipeline};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ScriptedSource {
    scripts: Mutex<HashMap<&'static str, Vec<Change<Value>>>>,
    scopes: Mutex<Vec<(&'static str, Option<String>)>>,
}

impl ScriptedSource {
    fn with(self, resource: &'static str, script: Vec<Change<Value>>) -> Self {
        self.scripts.lock().unwrap().insert(resource, script);
        self
    }
}

impl WatchSource for ScriptedSource {
    fn watch<K: WatchedObject>(&self, resource: &'static ResourceDescriptor, namespace: Option<&str>) -> ChangeStream<K> {
        self.scopes.lock().unwrap().push((resource.name, namespace.map(str::to_owned)));
        let decode = |v: Value| -> K { serde_json::from_value(v).unwrap() };
        let script = self.scripts.lock().unwrap().remove(resource.name).unwrap_or_default();
        let changes: Vec<Change<K>> = script
            .into_iter()
            .map(|c| match c {
                Change::Applied(v) => Change::Applied(decode(v)),
                Change::Deleted(v) => Change::Deleted(decode(v)),
                Change::Restarted(vs) => Change::Restarted(vs.into_iter().map(decode).collect()),
            })
            .collect();
        stream::iter(changes).chain(stream::pending()).boxed()
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap().lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    async fn wait_for(&self, n: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let records = self.records();
                if records.len() >= n {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for output")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn cm(name: &str, value: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": "default", "uid": format!("uid-{name}")},
        "data": {"k": value}
    })
}

fn svc(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": name, "namespace": "default", "uid": format!("uid-{name}")},
        "spec": {"ports": [{"port": 80}, {"port": 443}]}
    })
}

fn source() -> Arc<ScriptedSource> {
    Arc::new(
        ScriptedSource::default()
            .with(
                "configMaps",
                vec![
                    Change::Restarted(vec![cm("old", "0")]),
                    Change::Applied(cm("one", "1")),
                    Change::Applied(cm("two", "2")),
                    Change::Deleted(cm("one", "1")),
                ],
            )
            .with("services", vec![Change::Restarted(vec![]), Change::Applied(svc("web"))]),
    )
}

#[tokio::test]
async fn nested_lines_follow_per_resource_order() {
    let buf = SharedBuf::default();
    let fanout = Fanout::new().with(Arc::new(ConsoleSink::with_writer(buf.clone())), FailurePolicy::BestEffort);
    let handler = Arc::new(Pipeline::new(OutputMode::Nested, fanout));
    let source = source();
    let sup = WatchSupervisor::new(
        &ResourceRegistry::builtin(),
        &["configMaps", "services"],
        Some("default".into()),
        Arc::clone(&source),
        handler,
    )
    .unwrap();
    let token = CancellationToken::new();
    let run = tokio::spawn(sup.run(token.clone()));

    let records = buf.wait_for(4).await;
    token.cancel();
    run.await.unwrap().unwrap();

    let config_maps: Vec<_> = records
        .iter()
        .filter(|r| r["kind"] == "ConfigMap")
        .map(|r| r["metadata"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(config_maps, ["one", "two", "one"]);
    let services: Vec<_> = records.iter().filter(|r| r["kind"] == "Service").collect();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["spec"]["ports"][1]["port"], 443);
    assert_eq!(buf.records().len(), 4, "baseline objects must not be printed");

    let mut scopes = source.scopes.lock().unwrap().clone();
    scopes.sort();
    assert_eq!(scopes, [("configMaps", Some("default".to_owned())), ("services", Some("default".to_owned()))]);
}

#[tokio::test]
async fn flat_lines_use_the_default_root() {
    let buf = SharedBuf::default();
    let fanout = Fanout::new().with(Arc::new(ConsoleSink::with_writer(buf.clone())), FailurePolicy::BestEffort);
    let handler = Arc::new(Pipeline::new(OutputMode::Flat { root: kubewatch_core::DEFAULT_ROOT.into() }, fanout));
    let sup = WatchSupervisor::new(&ResourceRegistry::builtin(), &["services"], None, source(), handler).unwrap();
    let token = CancellationToken::new();
    let run = tokio::spawn(sup.run(token.clone()));

    let records = buf.wait_for(1).await;
    token.cancel();
    run.await.unwrap().unwrap();

    let web = &records[0];
    assert_eq!(web["kubewatch_kind"], "Service");
    assert_eq!(web["kubewatch_metadata_name"], "web");
    assert_eq!(web["kubewatch_spec_ports#"], "2");
    assert_eq!(web["kubewatch_spec_ports0_port"], "80");
    assert_eq!(web["kubewatch_spec_ports1_port"], "443");
}
