//! Connection artifacts for downstream tools
//!
//! Both files are regenerated from scratch on every successful run.

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// `psql postgresql://<user>:<password>@localhost:<port>/<database>`
pub fn connection_record(config: &BootstrapConfig) -> String {
    format!(
        "psql postgresql://{}:{}@localhost:{}/{}",
        config.user, config.password, config.port, config.database
    )
}

/// Key/value lines for the visualizer. The URL carries no credentials.
pub fn env_export(config: &BootstrapConfig) -> String {
    format!(
        "DATABASE_URL=postgresql://localhost:{port}/{db}\n\
         DB_USER={user}\n\
         DB_PASSWORD={password}\n\
         DB_NAME={db}\n\
         DB_PORT={port}\n",
        port = config.port,
        db = config.database,
        user = config.user,
        password = config.password,
    )
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let to_err = |source| BootstrapError::Artifacts {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::write(path, contents).map_err(to_err)
}

/// Write the Connection Record and the Environment Export File.
pub fn write_artifacts(config: &BootstrapConfig) -> Result<()> {
    write_file(
        &config.connection_file,
        &format!("{}\n", connection_record(config)),
    )?;
    write_file(&config.env_file, &env_export(config))?;

    info!(
        connection_file = %config.connection_file.display(),
        env_file = %config.env_file.display(),
        "Connection artifacts written"
    );
    Ok(())
}
