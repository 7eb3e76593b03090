use crate::auth::{Credentials, Identity, Permission, authenticate};
use crate::config::{AuthConfig, Config};
use crate::errors::{InspectionsError, Result};
use crate::metrics_defs::{AUTH_FAILURES, REQUEST_DURATION};
use crate::record::stamp;
use binstore::template::{Template, TemplateKeys};
use binstore::{DocumentService, DocumentStore, Entry, RetryPolicy, StoreError};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap, HeaderValue,
};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use shared::http::{full_body, make_error_response};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET,POST,DELETE,OPTIONS";
const ALLOW_HEADERS: &str = "content-type,x-user,x-pass,x-passcode";

const SIZE_HINT: &str = "PUTs start failing as approxMB nears the store's document size limit; \
    spread entries over more documents or prune old ones";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Inspections,
    Repair,
    Templates,
    Diag,
    Config,
}

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/api/inspections" => Some(Route::Inspections),
            "/api/inspections/repair" => Some(Route::Repair),
            "/api/templates" => Some(Route::Templates),
            "/api/diag" => Some(Route::Diag),
            "/api/config" => Some(Route::Config),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Route::Inspections => "inspections",
            Route::Repair => "repair",
            Route::Templates => "templates",
            Route::Diag => "diag",
            Route::Config => "config",
        }
    }
}

struct Query(HashMap<String, String>);

impl Query {
    fn parse(query: Option<&str>) -> Self {
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes());
        Query(pairs.into_owned().collect())
    }

    /// Trimmed value; blanks count as absent.
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v != "0" && v != "false")
    }

    fn require(&self, key: &'static str) -> Result<&str> {
        self.get(key).ok_or(InspectionsError::MissingParameter(key))
    }

    fn template_keys(&self) -> TemplateKeys {
        let owned = |key: &str| self.get(key).map(str::to_string);
        TemplateKeys {
            supplier: owned("supplier"),
            part_no: owned("partNo"),
            drawing_no: owned("drawingNo"),
            material: owned("material"),
            spec: owned("spec"),
            category: owned("category"),
            process: owned("process"),
        }
    }
}

struct State {
    service: DocumentService,
    records: String,
    templates: Vec<String>,
    auth: AuthConfig,
}

/// The inspections API.
///
/// Requests are fully buffered before dispatch; every response, errors
/// included, carries the CORS headers.
#[derive(Clone)]
pub struct Router {
    state: Arc<State>,
}

impl Router {
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Router {
            state: Arc::new(State {
                service: DocumentService::new(store, RetryPolicy::from(&config.retry)),
                records: config.documents.records.clone(),
                templates: config.documents.template_documents(),
                auth: config.auth.clone(),
            }),
        }
    }

    pub async fn handle(&self, req: Request<Bytes>) -> Response<Bytes> {
        let started = Instant::now();
        let route = Route::from_path(req.uri().path());

        let mut response = if req.method() == Method::OPTIONS {
            empty_response(StatusCode::NO_CONTENT)
        } else {
            match self.dispatch(route, req).await {
                Ok(response) => response,
                Err(e) => error_response(&e),
            }
        };
        add_cors_headers(response.headers_mut());

        histogram!(
            REQUEST_DURATION,
            "status" => response.status().as_u16().to_string(),
            "route" => route.map_or("unknown", Route::name)
        )
        .record(started.elapsed().as_secs_f64());

        response
    }

    async fn dispatch(
        &self,
        route: Option<Route>,
        req: Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let Some(route) = route else {
            tracing::debug!(path = %req.uri().path(), "No route matched");
            return Err(InspectionsError::NotFound);
        };

        let (parts, body) = req.into_parts();
        let query = Query::parse(parts.uri.query());
        let identity = authenticate(&self.state.auth, &Credentials::from_headers(&parts.headers));
        tracing::debug!(
            route = route.name(),
            method = %parts.method,
            user = identity.as_ref().map(|i| i.user.as_str()),
            "Dispatching request"
        );

        match (route, &parts.method) {
            (Route::Inspections, &Method::GET) => self.get_inspections(identity, &query).await,
            (Route::Inspections, &Method::POST) => {
                let identity = authorize(identity, Permission::Write, route)?;
                self.create_record(&identity, &body).await
            }
            (Route::Inspections, &Method::DELETE) => {
                authorize(identity, Permission::Delete, route)?;
                let removed = self
                    .state
                    .service
                    .delete_record(&self.state.records, query.require("id")?)
                    .await?;
                Ok(json_response(StatusCode::OK, &json!({"ok": true, "removed": removed})))
            }
            (Route::Repair, &Method::POST) => {
                authorize(identity, Permission::Delete, route)?;
                let count = self.state.service.repair(&self.state.records).await?;
                Ok(json_response(StatusCode::OK, &json!({"ok": true, "count": count})))
            }
            (Route::Templates, &Method::GET) => {
                authorize(identity, Permission::Read, route)?;
                let templates = self
                    .state
                    .service
                    .list_templates(&self.state.templates, &query.template_keys())
                    .await;
                Ok(json_response(
                    StatusCode::OK,
                    &json!({"ok": true, "templates": templates}),
                ))
            }
            (Route::Templates, &Method::POST) => {
                let identity = authorize(identity, Permission::Write, route)?;
                let template: Template = serde_json::from_slice(&body)
                    .map_err(|e| InspectionsError::InvalidBody(e.to_string()))?;
                let saved = self
                    .state
                    .service
                    .save_template(&self.state.templates, template, Some(&identity.user))
                    .await?;
                Ok(json_response(
                    StatusCode::OK,
                    &json!({"ok": true, "id": saved.id, "document": saved.document}),
                ))
            }
            (Route::Templates, &Method::DELETE) => {
                authorize(identity, Permission::Delete, route)?;
                let removed = self
                    .state
                    .service
                    .delete_template(&self.state.templates, query.require("id")?)
                    .await?;
                Ok(json_response(StatusCode::OK, &json!({"ok": true, "removed": removed})))
            }
            (Route::Diag, &Method::GET) => {
                authorize(identity, Permission::Diagnose, route)?;
                Ok(self.diagnostics().await)
            }
            (Route::Config, &Method::GET) => Ok(json_response(
                StatusCode::OK,
                &json!({"binId": self.state.records}),
            )),
            _ => Err(InspectionsError::MethodNotAllowed),
        }
    }

    async fn get_inspections(
        &self,
        identity: Option<Identity>,
        query: &Query,
    ) -> Result<Response<Bytes>> {
        let records = &self.state.records;

        // health and auth probes answer without credentials
        if query.flag("health") {
            let role = identity.as_ref().map_or("", |i| i.role.as_str());
            return Ok(match self.state.service.list_records(records).await {
                Ok(list) => json_response(
                    StatusCode::OK,
                    &json!({
                        "ok": true,
                        "role": role,
                        "bin": !records.is_empty(),
                        "count": list.len(),
                    }),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "Health check could not read the store");
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({"ok": false, "kind": e.kind(), "error": e.to_string()}),
                    )
                }
            });
        }
        if query.flag("auth") {
            let identity = authorize(identity, Permission::Read, Route::Inspections)?;
            return Ok(json_response(
                StatusCode::OK,
                &json!({"ok": true, "user": identity.user, "role": identity.role}),
            ));
        }

        authorize(identity, Permission::Read, Route::Inspections)?;
        let list = self.state.service.list_records(records).await?;

        match query.get("id") {
            Some(id) => list
                .into_iter()
                .find(|record| record.id() == Some(id))
                .map(|record| json_response(StatusCode::OK, &record))
                .ok_or(InspectionsError::NotFound),
            None => Ok(json_response(StatusCode::OK, &json!({"records": list}))),
        }
    }

    async fn create_record(&self, identity: &Identity, body: &Bytes) -> Result<Response<Bytes>> {
        let mut entry = if body.is_empty() {
            Entry::default()
        } else {
            let value: Value = serde_json::from_slice(body)
                .map_err(|e| InspectionsError::InvalidBody(e.to_string()))?;
            Entry::from_value(value)
                .ok_or_else(|| InspectionsError::InvalidBody("expected a JSON object".into()))?
        };

        let stamp = stamp(&mut entry, Some(&identity.user));
        self.state
            .service
            .append_record(&self.state.records, entry)
            .await?;

        tracing::info!(
            id = %stamp.id,
            user = %identity.user,
            overall = stamp.overall,
            "Record saved"
        );
        Ok(json_response(
            StatusCode::OK,
            &json!({
                "ok": true,
                "id": stamp.id,
                "timestamp": stamp.timestamp,
                "overall": stamp.overall,
            }),
        ))
    }

    /// Size report for every configured document. A document that cannot be
    /// read is reported as such without failing the response.
    async fn diagnostics(&self) -> Response<Bytes> {
        let mut documents: Vec<&String> = vec![&self.state.records];
        for template in &self.state.templates {
            if !documents.contains(&template) {
                documents.push(template);
            }
        }

        let mut report = Map::new();
        for document in documents {
            let info = match self.state.service.document_stats(document).await {
                Ok(stats) => json!({
                    "ok": true,
                    "count": stats.count,
                    "approxBytes": stats.approx_bytes,
                    "approxKB": (stats.approx_bytes as f64 / 102.4).round() / 10.0,
                    "approxMB": (stats.approx_bytes as f64 / 10_485.76).round() / 100.0,
                    "sampleIds": stats.sample_ids,
                }),
                Err(e) => {
                    let status = match &e {
                        StoreError::Status { status, .. } => *status,
                        _ => 0,
                    };
                    json!({
                        "ok": false,
                        "kind": e.kind(),
                        "status": status,
                        "detail": e.to_string(),
                        "count": 0,
                        "approxBytes": 0,
                    })
                }
            };
            report.insert(document.clone(), info);
        }

        json_response(
            StatusCode::OK,
            &json!({"ok": true, "documents": report, "hint": SIZE_HINT}),
        )
    }
}

fn authorize(identity: Option<Identity>, permission: Permission, route: Route) -> Result<Identity> {
    let error = match identity {
        Some(identity) if identity.role.allows(permission) => return Ok(identity),
        Some(_) => InspectionsError::Forbidden,
        None => InspectionsError::Unauthorized,
    };
    counter!(AUTH_FAILURES, "route" => route.name()).increment(1);
    Err(error)
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Bytes> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Bytes::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            make_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn error_response(error: &InspectionsError) -> Response<Bytes> {
    let status = error.status();
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    } else {
        tracing::debug!(error = %error, status = status.as_u16(), "Request rejected");
    }
    json_response(
        status,
        &json!({"ok": false, "kind": error.kind(), "error": error.to_string()}),
    )
}

fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
}

impl Service<Request<Incoming>> for Router {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = InspectionsError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let response = match body.collect().await {
                Ok(collected) => {
                    router
                        .handle(Request::from_parts(parts, collected.to_bytes()))
                        .await
                }
                Err(e) => {
                    let mut response =
                        error_response(&InspectionsError::RequestBodyError(e.to_string()));
                    add_cors_headers(response.headers_mut());
                    response
                }
            };
            Ok(response.map(full_body))
        })
    }
}
