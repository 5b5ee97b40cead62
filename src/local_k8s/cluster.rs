use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::TryFutureExt;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams};
use kube::discovery::{Discovery, Scope};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{DeleteError, Error, Result};
use crate::reclaim::{ResourceRecord, ResourceRef, ResourceStore};

const PAGE_SIZE: u32 = 500;

/// How to reach the cluster. Read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// API server URL. Falls back to kubeconfig / in-cluster config when unset.
    pub server: Option<String>,
    /// Bearer token used together with `server`.
    pub token: Option<String>,
    pub accept_invalid_certs: bool,
}

impl ClusterConfig {
    fn to_kube_config(&self, server: &str) -> Result<Config> {
        let url = server
            .parse::<http::Uri>()
            .map_err(|e| Error::Configuration(format!("invalid server url {server}: {e}")))?;
        let mut config = Config::new(url);
        config.accept_invalid_certs = self.accept_invalid_certs;
        if let Some(token) = &self.token {
            config.auth_info.token = Some(token.clone().into());
        }
        Ok(config)
    }
}

/// [`ResourceStore`] over the kubernetes dynamic API.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub async fn connect(config: &ClusterConfig) -> Result<Self> {
        let client = match config.server.as_deref() {
            Some(server) => Client::try_from(config.to_kube_config(server)?)
                .map_err(|e| Error::Connection(e.to_string()))?,
            None => Client::try_default()
                .await
                .map_err(|e| Error::Connection(e.to_string()))?,
        };
        Ok(Self { client })
    }

    /// Finds the served resource whose kind or plural name is `kind`.
    async fn resolve(&self, kind: &str) -> Result<ApiResource> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if ar.kind != kind && ar.plural != kind {
                    continue;
                }
                if caps.scope != Scope::Namespaced {
                    return Err(Error::InvalidArgument(format!("{kind} is not namespaced")));
                }
                debug!(kind, api_version = %ar.api_version, "resolved kind");
                return Ok(ar);
            }
        }

        Err(Error::UnknownKind(kind.to_string()))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    type Handle = Api<DynamicObject>;

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<ResourceRecord<Self::Handle>>> {
        let ar = self.resolve(kind).await?;
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        list_all(&api, kind, namespace).await
    }

    async fn delete(&self, record: &ResourceRecord<Self::Handle>) -> std::result::Result<(), DeleteError> {
        delete_named(&record.handle, &record.reference.name).await
    }
}

/// Reads every page of `api`, following `continue` tokens. Nameless objects are dropped.
async fn list_all(
    api: &Api<DynamicObject>,
    kind: &str,
    namespace: &str,
) -> Result<Vec<ResourceRecord<Api<DynamicObject>>>> {
    let mut records = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut lp = ListParams::default().limit(PAGE_SIZE);
        if let Some(t) = &token {
            lp = lp.continue_token(t);
        }
        let page = api
            .list(&lp)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        for obj in page.items {
            let Some(name) = obj.metadata.name else {
                continue;
            };
            let creation_timestamp = obj
                .metadata
                .creation_timestamp
                .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true));
            records.push(ResourceRecord {
                reference: ResourceRef::new(kind, namespace, name),
                creation_timestamp,
                handle: api.clone(),
            });
        }

        token = page.metadata.continue_.filter(|t| !t.is_empty());
        if token.is_none() {
            break;
        }
    }

    Ok(records)
}

/// Background delete; a 404 means the object is already gone.
async fn delete_named(api: &Api<DynamicObject>, name: &str) -> std::result::Result<(), DeleteError> {
    api.delete(name, &DeleteParams::background())
        .map_ok(|_| ())
        .map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => DeleteError::NotFound { name: name.to_string() },
            e => DeleteError::Api(e.to_string()),
        })
        .await
}
