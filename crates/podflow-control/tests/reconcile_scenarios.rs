//! End-to-end reconciliation scenarios against a stateful in-memory control
//! plane.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use podflow_control::{
    ControlPlane, CreateEndpointInput, CreatePodInput, CreateTemplateInput, Endpoint, Pod,
    Reconciler,
};
use podflow_core::{PodflowError, Project, ProjectSection, RemoteLayout, Result};

#[derive(Default)]
struct State {
    pods: Vec<Pod>,
    endpoints: Vec<Endpoint>,
    unavailable: Vec<String>,
    create_pod_calls: Vec<String>,
    create_endpoint_calls: usize,
    update_calls: Vec<(String, String)>,
    templates: usize,
}

#[derive(Default)]
struct FakeControlPlane {
    state: Mutex<State>,
}

impl FakeControlPlane {
    fn with_unavailable(classes: &[&str]) -> Self {
        let fake = Self::default();
        fake.state.lock().unavailable = classes.iter().map(ToString::to_string).collect();
        fake
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        Ok(self.state.lock().pods.clone())
    }

    async fn create_pod(&self, input: &CreatePodInput) -> Result<Pod> {
        let mut state = self.state.lock();
        state.create_pod_calls.push(input.gpu_type_id.clone());
        if state.unavailable.contains(&input.gpu_type_id) {
            return Err(PodflowError::control_plane(
                "createPod",
                "There are no longer any instances available",
            ));
        }
        let pod = Pod {
            id: format!("pod-{}", input.gpu_type_id),
            name: input.name.clone(),
            ..Pod::default()
        };
        state.pods.push(pod.clone());
        Ok(pod)
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.state.lock().endpoints.clone())
    }

    async fn create_endpoint(&self, input: &CreateEndpointInput) -> Result<Endpoint> {
        let mut state = self.state.lock();
        state.create_endpoint_calls += 1;
        let endpoint = Endpoint {
            id: format!("ep-{}", state.create_endpoint_calls),
            name: input.name.clone(),
            template_id: Some(input.template_id.clone()),
        };
        state.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint_template(&self, endpoint_id: &str, template_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .update_calls
            .push((endpoint_id.to_string(), template_id.to_string()));
        let endpoint = state
            .endpoints
            .iter_mut()
            .find(|e| e.id == endpoint_id)
            .ok_or_else(|| PodflowError::control_plane("updateEndpointTemplate", "no such endpoint"))?;
        endpoint.template_id = Some(template_id.to_string());
        Ok(())
    }

    async fn create_template(&self, _input: &CreateTemplateInput) -> Result<String> {
        let mut state = self.state.lock();
        state.templates += 1;
        Ok(format!("tpl-{}", state.templates))
    }
}

fn project(candidates: &[&str]) -> Project {
    Project {
        name: "hello".into(),
        project: ProjectSection {
            uuid: "abcd1234".into(),
            gpu_types: candidates.iter().map(ToString::to_string).collect(),
            ..ProjectSection::default()
        },
        ..Project::default()
    }
}

#[tokio::test]
async fn falls_back_from_a100_to_a6000() {
    let fake = Arc::new(FakeControlPlane::with_unavailable(&["A100"]));
    let reconciler = Reconciler::new(fake.clone());

    let id = reconciler
        .ensure_pod(&project(&["A100", "A6000"]), None)
        .await
        .unwrap();

    assert_eq!(id, "pod-A6000");
    assert_eq!(fake.state.lock().create_pod_calls, vec!["A100", "A6000"]);
}

#[tokio::test]
async fn second_session_reuses_the_pod() {
    let fake = Arc::new(FakeControlPlane::default());
    let reconciler = Reconciler::new(fake.clone());
    let p = project(&["A100"]);

    let first = reconciler.ensure_pod(&p, None).await.unwrap();
    let second = reconciler.ensure_pod(&p, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fake.state.lock().create_pod_calls.len(), 1);
}

#[tokio::test]
async fn every_candidate_tried_once_when_all_fail() {
    let fake = Arc::new(FakeControlPlane::with_unavailable(&["A100", "A6000", "L4"]));
    let reconciler = Reconciler::new(fake.clone());

    let err = reconciler
        .ensure_pod(&project(&["A100", "A6000", "L4"]), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PodflowError::ResourceUnavailable { .. }));
    assert_eq!(fake.state.lock().create_pod_calls, vec!["A100", "A6000", "L4"]);
}

#[tokio::test]
async fn endpoint_repoint_is_idempotent() {
    let fake = Arc::new(FakeControlPlane::default());
    let reconciler = Reconciler::new(fake.clone());
    let p = project(&[]);

    let (created_id, created) = reconciler.ensure_endpoint(&p, "t0", None).await.unwrap();
    assert!(created);

    let (id1, _) = reconciler.ensure_endpoint(&p, "t1", None).await.unwrap();
    let (id2, _) = reconciler.ensure_endpoint(&p, "t2", None).await.unwrap();

    assert_eq!(id1, created_id);
    assert_eq!(id2, created_id);
    let state = fake.state.lock();
    assert_eq!(state.create_endpoint_calls, 1);
    assert_eq!(state.endpoints[0].template_id.as_deref(), Some("t2"));
}

#[tokio::test]
async fn existing_endpoint_only_takes_update_path() {
    let fake = Arc::new(FakeControlPlane::default());
    fake.state.lock().endpoints.push(Endpoint {
        id: "ep-existing".into(),
        name: "hello-endpoint-abcd1234 -fb".into(),
        template_id: Some("tpl-old".into()),
    });
    let reconciler = Reconciler::new(fake.clone());

    let p = project(&[]);
    let outcome = reconciler
        .deploy(&p, &RemoteLayout::new(&p), None)
        .await
        .unwrap();

    assert_eq!(outcome.endpoint_id, "ep-existing");
    assert!(!outcome.created);
    let state = fake.state.lock();
    assert_eq!(state.create_endpoint_calls, 0);
    assert_eq!(
        state.update_calls,
        vec![("ep-existing".to_string(), outcome.template_id.clone())]
    );
}
