//! Opens source readers by driver.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ConnectionDescriptor;
use crate::core::schema::Driver;
use crate::core::traits::{SourceConnector, SourceReader};
use crate::drivers::{MssqlReader, MysqlReader, PgSourceReader};
use crate::error::Result;

/// Production [`SourceConnector`]: one reader type per driver.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    session_tuning: bool,
}

impl ConnectionRegistry {
    pub fn new(session_tuning: bool) -> Self {
        Self { session_tuning }
    }
}

#[async_trait]
impl SourceConnector for ConnectionRegistry {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn SourceReader>> {
        descriptor.validate()?;
        debug!("Opening {} source {}", descriptor.driver, descriptor.endpoint());

        let reader: Box<dyn SourceReader> = match descriptor.driver {
            Driver::Postgres => Box::new(PgSourceReader::connect(descriptor).await?),
            Driver::Mysql | Driver::Mariadb => Box::new(MysqlReader::connect(descriptor).await?),
            Driver::Sqlserver => Box::new(MssqlReader::connect(descriptor).await?),
        };

        if self.session_tuning {
            if let Err(e) = reader.tune_session().await {
                warn!("Session tuning skipped for {}: {}", descriptor.endpoint(), e);
            }
        }

        Ok(reader)
    }
}
