use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Row};

use crate::config::ConnectionParameters;
use crate::error::ProbeError;
use crate::verify::{ReadinessProbe, expect_single_row};

/// Readiness probe for MySQL-compatible servers.
#[derive(Debug, Default, Clone)]
pub struct MySqlProbe;

impl MySqlProbe {
    pub fn new() -> Self {
        Self
    }

    fn opts(params: &ConnectionParameters) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(params.host.clone())
            .tcp_port(params.port)
            .user(Some(params.user.clone()))
            .pass(Some(params.password.clone()))
            .db_name(Some(params.database.clone()))
            .prefer_socket(false)
    }
}

#[async_trait]
impl ReadinessProbe for MySqlProbe {
    async fn probe(&self, params: &ConnectionParameters, query: &str) -> Result<(), ProbeError> {
        let mut conn = Conn::new(Self::opts(params))
            .await
            .map_err(|e| ProbeError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason: e.to_string(),
            })?;

        let result: Result<Vec<Row>, _> = conn.query(query).await;

        if let Err(e) = conn.disconnect().await {
            tracing::trace!("Ignoring MySQL disconnect error: {}", e);
        }

        let rows = result.map_err(|e| ProbeError::Query {
            reason: e.to_string(),
        })?;

        expect_single_row(rows.len())
    }
}
