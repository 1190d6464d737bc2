use async_trait::async_trait;
use tokio_postgres::NoTls;

use crate::config::ConnectionParameters;
use crate::error::ProbeError;
use crate::verify::{ReadinessProbe, expect_single_row};

/// Readiness probe for PostgreSQL servers.
#[derive(Debug, Default, Clone)]
pub struct PostgresProbe;

impl PostgresProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn probe(&self, params: &ConnectionParameters, query: &str) -> Result<(), ProbeError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .user(&params.user)
            .password(&params.password)
            .dbname(&params.database);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| ProbeError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason: e.to_string(),
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!("Postgres probe connection closed with error: {}", e);
            }
        });

        let result = client.query(query, &[]).await;

        // Dropping the client closes the connection; the driver task then ends.
        drop(client);
        let _ = driver.await;

        let rows = result.map_err(|e| ProbeError::Query {
            reason: e.to_string(),
        })?;

        expect_single_row(rows.len())
    }
}
