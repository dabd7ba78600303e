//! HTTP client for the external JSON-over-relational Storage service
//! (spec.md §1, §6). Mirrors the shape of the teacher's `oci::client`
//! and registry provider clients: a thin `reqwest::Client` wrapper with one
//! generic implementation reused across every resource kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Error, Filter, ListOptions, Operator, Storage};
use crate::entities::{Entity, Resource};

#[derive(Clone)]
pub struct HttpStorage {
    client: reqwest::Client,
    base_url: String,
    jwt_secret: String,
}

impl HttpStorage {
    pub fn new(base_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            jwt_secret: jwt_secret.into(),
        }
    }

    fn url(&self, kind: &str, suffix: &str) -> String {
        format!(
            "{}/api/v1/resources/{}{}",
            self.base_url.trim_end_matches('/'),
            kind,
            suffix
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.jwt_secret)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(Error::NotFound),
            reqwest::StatusCode::CONFLICT => Err(Error::Conflict { expected: None }),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| Error::Decode(e.to_string())),
            status => Err(Error::Transport(format!("storage returned {status}"))),
        }
    }
}

fn operator_str(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "eq",
        Operator::Neq => "neq",
        Operator::Gt => "gt",
        Operator::Lt => "lt",
        Operator::IsNull => "is_null",
        Operator::IsNotNull => "is_not_null",
    }
}

#[derive(Serialize)]
struct FilterQuery<'a> {
    column: &'a str,
    operator: &'static str,
    value: &'a serde_json::Value,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    filters: Vec<FilterQuery<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

impl<'a> From<&'a ListOptions> for ListRequest<'a> {
    fn from(opts: &'a ListOptions) -> Self {
        ListRequest {
            filters: opts
                .filters
                .iter()
                .map(|f| FilterQuery {
                    column: &f.column,
                    operator: operator_str(f.operator),
                    value: &f.value,
                })
                .collect(),
            limit: opts.limit,
        }
    }
}

#[derive(Serialize)]
struct StatusUpdateRequest<'a, S> {
    status: &'a S,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_phase: Option<&'a str>,
}

#[async_trait]
impl<E: Entity> Storage<E> for HttpStorage {
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Resource<E>>, Error> {
        let req: ListRequest = opts.into();
        self.send(
            self.client
                .post(self.url(E::KIND, "/list"))
                .json(&req),
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Resource<E>, Error> {
        self.send(
            self.client
                .get(self.url(E::KIND, &format!("/{id}"))),
        )
        .await
    }

    async fn get_by_name(&self, workspace: &str, name: &str) -> Result<Resource<E>, Error> {
        let opts = ListOptions::new()
            .filter(Filter::eq("metadata->workspace", workspace))
            .filter(Filter::eq("metadata->name", name))
            .limit(1);
        let mut results: Vec<Resource<E>> = self.list(&opts).await?;
        results.pop().ok_or(Error::NotFound)
    }

    async fn create(&self, obj: &Resource<E>) -> Result<Resource<E>, Error> {
        self.send(
            self.client
                .post(self.url(E::KIND, ""))
                .json(obj),
        )
        .await
    }

    async fn update(&self, obj: &Resource<E>) -> Result<Resource<E>, Error> {
        self.send(
            self.client
                .put(self.url(E::KIND, &format!("/{}", obj.id)))
                .json(obj),
        )
        .await
    }

    async fn patch(&self, id: Uuid, patch: serde_json::Value) -> Result<Resource<E>, Error> {
        self.send(
            self.client
                .patch(self.url(E::KIND, &format!("/{id}")))
                .json(&patch),
        )
        .await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: &E::Status,
        expected_phase: Option<&str>,
    ) -> Result<(), Error> {
        let req = StatusUpdateRequest {
            status,
            expected_phase,
        };
        let _: serde_json::Value = self
            .send(
                self.client
                    .patch(self.url(E::KIND, &format!("/{id}/status")))
                    .json(&req),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let response = self
            .authed(self.client.delete(self.url(E::KIND, &format!("/{id}"))))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Error::Transport(format!("storage returned {status}"))),
        }
    }
}
