//! Kubernetes API client.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Preconditions};
use tracing::debug;

use betternode_model::{Node, Pod, PodRef};

use crate::client::{ClusterClient, PodFieldSelector};
use crate::error::{ClusterError, ClusterResult};

/// [`ClusterClient`] backed by a live API server.
#[derive(Clone)]
pub struct KubeApiClient {
    client: kube::Client,
}

impl KubeApiClient {
    pub fn new(config: kube::Config) -> ClusterResult<Self> {
        Ok(Self::from_client(kube::Client::try_from(config)?))
    }

    pub fn from_client(client: kube::Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl ClusterClient for KubeApiClient {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        let list = self
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::from_request("node list", e))?;
        debug!(count = list.items.len(), "listed nodes");
        Ok(list.items)
    }

    async fn get_node(&self, name: &str) -> ClusterResult<Node> {
        self.nodes()
            .get(name)
            .await
            .map_err(|e| ClusterError::from_request(&format!("node {name}"), e))
    }

    async fn list_pods(&self, selector: &PodFieldSelector) -> ClusterResult<Vec<Pod>> {
        let field_selector = selector.to_query();
        let mut params = ListParams::default();
        if !field_selector.is_empty() {
            params = params.fields(&field_selector);
        }

        let list = Api::<Pod>::all(self.client.clone())
            .list(&params)
            .await
            .map_err(|e| ClusterError::from_request("pod list", e))?;
        debug!(count = list.items.len(), %field_selector, "listed pods");
        Ok(list.items)
    }

    async fn delete_pod(&self, pod: &PodRef) -> ClusterResult<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        match api.delete(&pod.name, &delete_params(pod)).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(pod = %pod, "pod already gone");
                Ok(())
            }
            Err(e) => Err(ClusterError::from_request(&format!("pod {pod}"), e)),
        }
    }
}

/// Deletion guarded by the uid observed at listing time.
fn delete_params(pod: &PodRef) -> DeleteParams {
    DeleteParams {
        preconditions: pod.uid.as_ref().map(|uid| Preconditions {
            uid: Some(uid.clone()),
            resource_version: None,
        }),
        ..DeleteParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use betternode_model::{NodeExt, PodExt};

    fn client(server: &MockServer) -> KubeApiClient {
        let config = kube::Config::new(server.uri().parse().unwrap());
        KubeApiClient::new(config).unwrap()
    }

    fn node_json(name: &str) -> serde_json::Value {
        json!({
            "metadata": {"name": name, "labels": {"gpu": "true"}},
            "status": {"allocatable": {"cpu": "4", "pods": "110"}}
        })
    }

    fn trainer(uid: Option<&str>) -> PodRef {
        PodRef {
            namespace: "ml".into(),
            name: "trainer".into(),
            uid: uid.map(str::to_string),
        }
    }

    fn status(code: u16, reason: &str) -> ResponseTemplate {
        ResponseTemplate::new(code).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "reason": reason,
            "message": format!("{reason} from test server"),
            "code": code
        }))
    }

    #[tokio::test]
    async fn lists_nodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "NodeList",
                "metadata": {},
                "items": [node_json("n1"), node_json("n2")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let nodes = client(&server).list_nodes().await.unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name(), "n1");
        assert_eq!(nodes[1].labels().get("gpu").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn get_node_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes/gone"))
            .respond_with(status(404, "NotFound"))
            .mount(&server)
            .await;

        let err = client(&server).get_node("gone").await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pods_sends_field_selector() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param(
                "fieldSelector",
                "status.phase!=Succeeded,status.phase!=Failed,status.phase!=Pending,spec.nodeName=n1",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": {},
                "items": [{
                    "metadata": {"name": "web", "namespace": "default", "uid": "u1"},
                    "spec": {"nodeName": "n1", "containers": []},
                    "status": {"phase": "Running"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pods = client(&server)
            .list_pods(&PodFieldSelector::active().on_node("n1"))
            .await
            .unwrap();

        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].node_name(), "n1");
    }

    #[tokio::test]
    async fn server_errors_carry_status_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .respond_with(status(403, "Forbidden"))
            .mount(&server)
            .await;

        let err = client(&server).list_nodes().await.unwrap_err();
        match err {
            ClusterError::Api { status, reason, .. } => {
                assert_eq!(status, 403);
                assert_eq!(reason, "Forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_sends_uid_precondition() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/ml/pods/trainer"))
            .and(body_partial_json(json!({"preconditions": {"uid": "abc"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "trainer", "namespace": "ml", "uid": "abc"},
                "spec": {"containers": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_pod(&trainer(Some("abc"))).await.unwrap();
    }

    #[tokio::test]
    async fn delete_of_missing_pod_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(status(404, "NotFound"))
            .mount(&server)
            .await;

        client(&server).delete_pod(&trainer(None)).await.unwrap();
    }

    #[tokio::test]
    async fn delete_conflict_is_precondition_failure() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(status(409, "Conflict"))
            .mount(&server)
            .await;

        let err = client(&server)
            .delete_pod(&trainer(Some("old")))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::PreconditionFailed(_)));
    }

    #[test]
    fn delete_params_carry_uid_when_known() {
        let guarded = delete_params(&trainer(Some("abc")));
        let preconditions = guarded.preconditions.unwrap();
        assert_eq!(preconditions.uid.as_deref(), Some("abc"));
        assert_eq!(preconditions.resource_version, None);

        assert!(delete_params(&trainer(None)).preconditions.is_none());
    }
}
