//! Blocking session facade over `POST /db/{database}/tx/commit`.
//!
//! Each write is one auto-committed transaction. Batches are bound as
//! `$dict.rows`, so statements read `UNWIND $dict.rows AS row ...`.

use std::time::Duration;

use graphingest_core::{
    Batch, GraphStore, Record, SHARED_RUNTIME, Session, StoreError, http_client,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE: &str = "neo4j";

/// Per-request timeout; large batches can take a while to commit
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [StatementBody<'a>; 1],
}

#[derive(Serialize)]
struct StatementBody<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Parameters<'a>>,
}

#[derive(Serialize)]
struct Parameters<'a> {
    dict: Rows<'a>,
}

#[derive(Serialize)]
struct Rows<'a> {
    rows: &'a [Record],
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Deserialize)]
struct ServerError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Connection settings shared by every session.
#[derive(Debug, Clone)]
pub struct HttpStore {
    endpoint: String,
    user: String,
    password: String,
}

impl HttpStore {
    /// `server_uri` is the HTTP root, e.g. `http://localhost:7474`.
    pub fn new(server_uri: &str, user: &str, password: &str, database: Option<&str>) -> Self {
        let database = database.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DATABASE);
        Self {
            endpoint: format!(
                "{}/db/{database}/tx/commit",
                server_uri.trim_end_matches('/')
            ),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GraphStore for HttpStore {
    type Session = HttpSession;

    fn begin_session(&self) -> Result<HttpSession, StoreError> {
        Ok(HttpSession {
            store: self.clone(),
            requests: 0,
        })
    }
}

/// One logical connection. Requests share the pooled HTTP client.
pub struct HttpSession {
    store: HttpStore,
    requests: u64,
}

impl HttpSession {
    fn commit(&mut self, body: &CommitRequest<'_>) -> Result<(), StoreError> {
        self.requests += 1;
        let store = &self.store;
        SHARED_RUNTIME.handle().block_on(async {
            let response = http_client()
                .post(&store.endpoint)
                .basic_auth(&store.user, Some(&store.password))
                .timeout(REQUEST_TIMEOUT)
                .json(body)
                .send()
                .await
                .map_err(|e| from_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(StoreError::Http {
                    status: Some(status.as_u16()),
                    message: message.trim().to_string(),
                });
            }

            let parsed: CommitResponse = response.json().await.map_err(|e| from_reqwest(&e))?;
            match parsed.errors.into_iter().next() {
                Some(err) => Err(StoreError::Rejected {
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(()),
            }
        })
    }
}

impl Session for HttpSession {
    fn execute(&mut self, statement: &str, batch: &Batch) -> Result<(), StoreError> {
        let body = CommitRequest {
            statements: [StatementBody {
                statement,
                parameters: Some(Parameters {
                    dict: Rows {
                        rows: batch.records(),
                    },
                }),
            }],
        };
        self.commit(&body)
    }

    fn run(&mut self, statement: &str) -> Result<(), StoreError> {
        let body = CommitRequest {
            statements: [StatementBody {
                statement,
                parameters: None,
            }],
        };
        self.commit(&body)
    }

    fn close(self) -> Result<(), StoreError> {
        log::trace!(
            "{}: session closed after {} request(s)",
            self.store.endpoint,
            self.requests
        );
        Ok(())
    }
}

fn from_reqwest(e: &reqwest::Error) -> StoreError {
    StoreError::Http {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}
