//! Firestore backend over the REST v1 API.
//!
//! Authenticates with a service-account key (signed JWT exchanged for an
//! OAuth2 access token) or, against the local emulator, with the fixed
//! `owner` token the emulator accepts.

use super::DocumentStore;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const PAGE_SIZE: &str = "300";

/// Refresh the access token this long before Google says it expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

// ── Credentials ────────────────────────────────────────────────────────────

/// The fields of a service-account key file that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read credentials file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a service-account key", path.display()))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

enum Auth {
    ServiceAccount {
        account: ServiceAccount,
        key: EncodingKey,
        token: Mutex<Option<AccessToken>>,
    },
    Emulator,
}

// ── Store ──────────────────────────────────────────────────────────────────

pub struct FirestoreStore {
    client: reqwest::Client,
    /// `.../projects/{p}/databases/(default)/documents`
    documents_root: String,
    auth: Auth,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

impl FirestoreStore {
    /// Connect to production Firestore with a service-account key.
    pub fn with_service_account(account: ServiceAccount, project_id: Option<String>) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .context("service-account private_key is not a valid RSA PEM key")?;
        let project = project_id.unwrap_or_else(|| account.project_id.clone());

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            documents_root: documents_root(FIRESTORE_ENDPOINT, &project),
            auth: Auth::ServiceAccount {
                account,
                key,
                token: Mutex::new(None),
            },
        })
    }

    /// Connect to a Firestore emulator, e.g. `http://localhost:8080`.
    pub fn emulator(endpoint: &str, project_id: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            documents_root: documents_root(endpoint.trim_end_matches('/'), project_id),
            auth: Auth::Emulator,
        })
    }

    fn url(&self, collection: &str, id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.documents_root)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Firestore endpoint cannot hold a path"))?;
            segments.extend(collection.split('/'));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn bearer(&self) -> Result<String> {
        match &self.auth {
            Auth::Emulator => Ok("owner".into()),
            Auth::ServiceAccount {
                account,
                key,
                token,
            } => {
                let mut cached = token.lock().await;
                if let Some(t) = cached.as_ref() {
                    if Instant::now() + TOKEN_SLACK < t.expires_at {
                        return Ok(t.value.clone());
                    }
                }

                let fresh = self.exchange_token(account, key).await?;
                let value = fresh.value.clone();
                *cached = Some(fresh);
                Ok(value)
            }
        }
    }

    async fn exchange_token(&self, account: &ServiceAccount, key: &EncodingKey) -> Result<AccessToken> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &account.client_email,
            scope: DATASTORE_SCOPE,
            aud: &account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
            .context("failed to sign service-account assertion")?;

        let resp = self
            .client
            .post(&account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("token exchange rejected ({status}): {body}");
        }

        let body: TokenResponse = resp.json().await.context("malformed token response")?;
        tracing::debug!("Obtained Firestore access token for {}", account.client_email);

        Ok(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }

    async fn list_page(&self, collection: &str, page_token: Option<&str>) -> Result<ListResponse> {
        let mut url = self.url(collection, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", PAGE_SIZE);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let resp = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        let resp = check(resp, collection).await?;
        Ok(resp.json().await?)
    }
}

fn documents_root(endpoint: &str, project_id: &str) -> String {
    format!("{endpoint}/v1/projects/{project_id}/databases/(default)/documents")
}

async fn check(resp: reqwest::Response, target: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!("Firestore request for {target} failed ({status}): {body}")
}

fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list_ids(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .stream(collection)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(self.url(collection, Some(id))?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: RawDocument = check(resp, collection).await?.json().await?;
        Ok(Some(decode_fields(&doc.fields)?))
    }

    async fn set(&self, collection: &str, id: &str, document: &Value) -> Result<()> {
        let fields = match document {
            Value::Object(map) => encode_fields(map),
            _ => bail!("Firestore documents must be JSON objects"),
        };

        // No updateMask: the stored document is replaced wholesale.
        let resp = self
            .client
            .patch(self.url(collection, Some(id))?)
            .bearer_auth(self.bearer().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check(resp, collection).await?;
        Ok(())
    }

    async fn stream(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(collection, page_token.as_deref()).await?;
            for doc in page.documents {
                let body = decode_fields(&doc.fields)?;
                out.push((document_id(&doc.name).to_owned(), body));
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(out)
    }
}

// ── Value codec ────────────────────────────────────────────────────────────

fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Convert plain JSON into a Firestore typed value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Value> {
    let mut out = Map::new();
    for (k, v) in fields {
        out.insert(k.clone(), decode_value(v).with_context(|| format!("field {k}"))?);
    }
    Ok(Value::Object(out))
}

/// Convert a Firestore typed value back into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value> {
    let (kind, inner) = value
        .as_object()
        .and_then(|m| m.iter().next())
        .ok_or_else(|| anyhow!("empty Firestore value"))?;

    Ok(match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => {
            let text = inner.as_str().map(str::to_owned).unwrap_or_else(|| inner.to_string());
            Value::from(text.parse::<i64>().with_context(|| format!("bad integerValue {text}"))?)
        }
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            Value::Array(values.iter().map(decode_value).collect::<Result<_>>()?)
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields)?,
            None => Value::Object(Map::new()),
        },
        other => bail!("unsupported Firestore value type {other}"),
    })
}
