//! Idempotent database, role and privilege provisioning
//!
//! Every statement here is safe to re-run: the database and role are created
//! only when missing, the role password is always reset to the configured
//! value, and grants are no-ops when already present.

use crate::binaries::{Binaries, Invocation, Tool};
use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use tracing::{debug, info};

/// Dollar-quote tag for the role block. Configured values may not contain it.
pub const DOLLAR_TAG: &str = "$pg_bootstrap$";

const NOTICE_ROLE_CREATED: &str = "pg_bootstrap: role created";
const NOTICE_ROLE_RESET: &str = "pg_bootstrap: role password reset";

/// Quote an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal (standard_conforming_strings on).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleStatus {
    Created,
    PasswordReset,
}

/// What provisioning did on this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
    pub database: DatabaseStatus,
    pub role: RoleStatus,
}

/// Role upsert: create with LOGIN and password, or reset the password.
pub fn role_sql(user: &str, password: &str) -> String {
    let ident = quote_ident(user);
    let name = quote_literal(user);
    let pass = quote_literal(password);
    format!(
        r#"SET password_encryption = 'scram-sha-256';

DO {tag}
BEGIN
    IF NOT EXISTS (SELECT FROM pg_catalog.pg_roles WHERE rolname = {name}) THEN
        CREATE ROLE {ident} WITH LOGIN PASSWORD {pass};
        RAISE NOTICE '{created}';
    ELSE
        ALTER ROLE {ident} WITH LOGIN PASSWORD {pass};
        RAISE NOTICE '{reset}';
    END IF;
END
{tag};
"#,
        tag = DOLLAR_TAG,
        created = NOTICE_ROLE_CREATED,
        reset = NOTICE_ROLE_RESET,
    )
}

/// Schema and default privileges for `user`, run against `database`.
pub fn grants_sql(database: &str, schema: &str, user: &str) -> String {
    let db = quote_ident(database);
    let schema = quote_ident(schema);
    let user = quote_ident(user);

    let mut sql = String::new();
    sql.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {schema};\n"));
    sql.push_str(&format!("GRANT ALL PRIVILEGES ON DATABASE {db} TO {user};\n"));
    sql.push_str(&format!("GRANT ALL ON SCHEMA {schema} TO {user};\n"));
    for object in ["TABLES", "SEQUENCES", "FUNCTIONS"] {
        sql.push_str(&format!(
            "GRANT ALL PRIVILEGES ON ALL {object} IN SCHEMA {schema} TO {user};\n"
        ));
    }
    for object in ["TABLES", "SEQUENCES", "FUNCTIONS", "TYPES"] {
        sql.push_str(&format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT ALL ON {object} TO {user};\n"
        ));
    }
    sql
}

/// Which branch the role block took, from psql's notice output.
pub fn parse_role_status(output: &str) -> Option<RoleStatus> {
    if output.contains(NOTICE_ROLE_CREATED) {
        Some(RoleStatus::Created)
    } else if output.contains(NOTICE_ROLE_RESET) {
        Some(RoleStatus::PasswordReset)
    } else {
        None
    }
}

/// createdb's complaint about an existing database.
pub fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("already exists")
}

/// Runs provisioning against a live server through psql/createdb
pub struct Provisioner<'a> {
    config: &'a BootstrapConfig,
    binaries: &'a Binaries,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &'a BootstrapConfig, binaries: &'a Binaries) -> Self {
        Self { config, binaries }
    }

    fn connection_args(&self) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.config.socket_dir.to_string_lossy().into_owned(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-U".to_string(),
            self.config.superuser.clone(),
        ]
    }

    fn psql(&self, database: &str) -> Invocation {
        self.binaries
            .invocation(Tool::Psql, self.config.run_as.as_deref())
            .args(["-X", "-q", "-v", "ON_ERROR_STOP=1"])
            .args(self.connection_args())
            .args(["-d", database])
    }

    /// Create the database unless it already exists.
    pub async fn ensure_database(&self) -> Result<DatabaseStatus> {
        let output = self
            .binaries
            .invocation(Tool::CreateDb, self.config.run_as.as_deref())
            .args(self.connection_args())
            .arg(self.config.database.clone())
            .run()
            .await?;

        if output.success {
            info!(database = %self.config.database, "Database created");
            Ok(DatabaseStatus::Created)
        } else if is_already_exists(&output.stderr) {
            info!(database = %self.config.database, "Database already exists");
            Ok(DatabaseStatus::AlreadyExists)
        } else {
            Err(BootstrapError::Provisioning(format!(
                "createdb {} failed (exit {}): {}",
                self.config.database,
                output.code_display(),
                output.stderr
            )))
        }
    }

    /// Create the role or reset its password to the configured one.
    pub async fn ensure_role(&self) -> Result<RoleStatus> {
        let output = self
            .psql("postgres")
            .run_with_input(&role_sql(&self.config.user, &self.config.password))
            .await?;

        if !output.success {
            return Err(BootstrapError::Provisioning(format!(
                "role {} (exit {}): {}",
                self.config.user,
                output.code_display(),
                output.stderr
            )));
        }

        let status = parse_role_status(&output.stderr)
            .or_else(|| parse_role_status(&output.stdout))
            .unwrap_or(RoleStatus::PasswordReset);
        match status {
            RoleStatus::Created => info!(role = %self.config.user, "Role created"),
            RoleStatus::PasswordReset => {
                info!(role = %self.config.user, "Role exists, password reset to configured value")
            }
        }
        Ok(status)
    }

    /// Apply schema and default privileges in one transaction.
    pub async fn grant_privileges(&self) -> Result<()> {
        let sql = grants_sql(&self.config.database, &self.config.schema, &self.config.user);
        debug!(sql = %sql, "Applying grants");

        let output = self
            .psql(&self.config.database)
            .arg("--single-transaction")
            .run_with_input(&sql)
            .await?;

        if output.success {
            info!(
                role = %self.config.user,
                schema = %self.config.schema,
                "Privileges granted"
            );
            Ok(())
        } else {
            Err(BootstrapError::Provisioning(format!(
                "grants on {}.{} (exit {}): {}",
                self.config.database,
                self.config.schema,
                output.code_display(),
                output.stderr
            )))
        }
    }

    /// Database, then role, then grants.
    pub async fn run(&self) -> Result<ProvisionReport> {
        let database = self.ensure_database().await?;
        let role = self.ensure_role().await?;
        self.grant_privileges().await?;
        Ok(ProvisionReport { database, role })
    }
}
