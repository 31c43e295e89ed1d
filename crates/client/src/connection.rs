//! HTTP transport for a Kubernetes-compatible API server
//!
//! Requests are authenticated with the bearer credential of the
//! [`ConnectionConfig`] they were built from. Non-success responses are
//! classified into the [`ClientError`] taxonomy using the status code and,
//! where present, the `reason` of the server's `Status` body.

use async_trait::async_trait;
use keel_config::ConnectionConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::{ClientError, ObjectRef};
use crate::resource::{ListParams, PropagationPolicy, Resource, ResourceKind};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy)]
enum RequestType {
    Get,
    Post,
    Put,
    Delete,
}

/// `Status` object returned by the API server on failures.
#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Resource>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOptions {
    kind: &'static str,
    api_version: &'static str,
    propagation_policy: PropagationPolicy,
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    base: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token().expose()))
            .map_err(|_| {
                ClientError::Validation("bearer credential is not a valid header value".to_owned())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth);
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.tls().is_skipped())
            .build()?;

        Ok(Self {
            base: config.server().clone(),
            client,
        })
    }

    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: Option<&str>,
    ) -> Result<Url, ClientError> {
        resource_url(&self.base, kind, namespace, name)
    }

    async fn request<I, O>(
        &self,
        req_type: RequestType,
        url: Url,
        body: Option<&I>,
        object: ObjectRef,
    ) -> Result<O, ClientError>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        debug!(method = ?req_type, %url, "sending request");

        let mut builder = match req_type {
            RequestType::Get => self.client.get(url),
            RequestType::Post => self.client.post(url),
            RequestType::Put => self.client.put(url),
            RequestType::Delete => self.client.delete(url),
        };

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = check(builder.send().await?, object).await?;

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builds the REST path for a collection or, given a name, a single object.
pub(crate) fn resource_url(
    base: &Url,
    kind: &ResourceKind,
    namespace: &str,
    name: Option<&str>,
) -> Result<Url, ClientError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            ClientError::Validation(format!("endpoint `{base}` cannot carry a path"))
        })?;
        let _ = segments.pop_if_empty();

        if kind.group.is_empty() {
            let _ = segments.extend(["api", kind.version]);
        } else {
            let _ = segments.extend(["apis", kind.group, kind.version]);
        }

        if kind.namespaced && !namespace.is_empty() {
            let _ = segments.extend(["namespaces", namespace]);
        }

        let _ = segments.push(kind.plural);

        if let Some(name) = name {
            let _ = segments.push(name);
        }
    }
    Ok(url)
}

async fn check(response: Response, object: ObjectRef) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let api_status = serde_json::from_slice::<ApiStatus>(&body).unwrap_or_default();

    Err(classify(status, &api_status, object))
}

fn classify(status: StatusCode, api_status: &ApiStatus, object: ObjectRef) -> ClientError {
    let message = if api_status.message.is_empty() {
        status.to_string()
    } else {
        api_status.message.clone()
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(object),
        StatusCode::CONFLICT if api_status.reason == "AlreadyExists" => {
            ClientError::AlreadyExists(object)
        }
        StatusCode::CONFLICT => ClientError::Conflict { object, message },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::Validation(message)
        }
        _ => ClientError::Transport(format!("{status}: {message}")),
    }
}

/// List items omit `apiVersion` and `kind`; restore them from the descriptor.
fn fill_type(kind: &ResourceKind, mut resource: Resource) -> Resource {
    if resource.api_version.is_empty() {
        resource.api_version = kind.api_version();
    }
    if resource.kind.is_empty() {
        resource.kind = kind.kind.to_owned();
    }
    resource
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError> {
        let url = self.url(kind, namespace, Some(name))?;
        let object = ObjectRef::new(kind, namespace, name);
        let resource = self
            .request(RequestType::Get, url, None::<&()>, object)
            .await?;
        Ok(fill_type(kind, resource))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Resource>, ClientError> {
        let mut url = self.url(kind, namespace, None)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(selector) = &params.label_selector {
                let _ = query.append_pair("labelSelector", selector);
            }
            if let Some(limit) = params.limit {
                let _ = query.append_pair("limit", &limit.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let object = ObjectRef::new(kind, namespace, "");
        let list: ObjectList = self
            .request(RequestType::Get, url, None::<&()>, object)
            .await?;

        Ok(list
            .items
            .into_iter()
            .map(|item| fill_type(kind, item))
            .collect())
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        let url = self.url(kind, namespace, None)?;
        let object = ObjectRef::new(kind, namespace, resource.name());
        let created = self
            .request(RequestType::Post, url, Some(resource), object)
            .await?;
        Ok(fill_type(kind, created))
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        let url = self.url(kind, namespace, Some(resource.name()))?;
        let object = ObjectRef::new(kind, namespace, resource.name());
        let updated = self
            .request(RequestType::Put, url, Some(resource), object)
            .await?;
        Ok(fill_type(kind, updated))
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), ClientError> {
        let url = self.url(kind, namespace, Some(name))?;
        let object = ObjectRef::new(kind, namespace, name);
        let options = DeleteOptions {
            kind: "DeleteOptions",
            api_version: "v1",
            propagation_policy: policy,
        };
        let _: serde_json::Value = self
            .request(RequestType::Delete, url, Some(&options), object)
            .await?;
        Ok(())
    }
}
