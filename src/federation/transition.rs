// SPDX-License-Identifier: Apache-2.0

//! Cross-Island Transition Manager
//!
//! Creates staging objects in the island that consumes intermediate results
//! of other islands, and removes them again. Staging is all-or-nothing per
//! call: a failed creation drops every object created earlier in the same
//! call. Unstaging drops with `IF EXISTS` semantics, so it can be repeated.

use std::collections::HashMap;
use std::sync::Arc;

use polystore_core::{Catalog, DbId, EngineSession, Scope, SessionOptions};
use tracing::{debug, info, instrument, warn};

use crate::engine::ConnectorRegistry;
use crate::error::IslandResult;
use crate::islands::{CapabilityRegistry, CreationStatement};

/// Objects created by one `stage` call, with the session that created them.
pub struct StagingHandle {
    scope: Scope,
    dbid: DbId,
    session: Box<dyn EngineSession>,
    created: Vec<String>,
}

impl StagingHandle {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dbid(&self) -> DbId {
        self.dbid
    }

    pub fn created(&self) -> &[String] {
        &self.created
    }
}

impl std::fmt::Debug for StagingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingHandle")
            .field("scope", &self.scope)
            .field("dbid", &self.dbid)
            .field("created", &self.created)
            .finish()
    }
}

pub struct TransitionManager {
    registry: Arc<CapabilityRegistry>,
    catalog: Arc<dyn Catalog>,
    connectors: Arc<ConnectorRegistry>,
}

/// `child_names ∩ keys(ddl_by_name)`, in child order without repeats.
fn staged_names<'a>(
    child_names: &'a [String],
    ddl_by_name: &'a HashMap<String, String>,
) -> Vec<(&'a str, &'a str)> {
    let mut seen = std::collections::HashSet::new();
    child_names
        .iter()
        .filter_map(|name| {
            ddl_by_name
                .get(name)
                .map(|ddl| (name.as_str(), ddl.as_str()))
        })
        .filter(|(name, _)| seen.insert(*name))
        .collect()
}

impl TransitionManager {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        catalog: Arc<dyn Catalog>,
        connectors: Arc<ConnectorRegistry>,
    ) -> Self {
        Self {
            registry,
            catalog,
            connectors,
        }
    }

    async fn open_session(&self, scope: Scope) -> IslandResult<(DbId, Box<dyn EngineSession>)> {
        let dbid = self.registry.schema_engine_id(scope)?;
        let descriptor = self.catalog.connection_info(dbid).await?;
        let session = self
            .connectors
            .connect(&descriptor, SessionOptions::auto_commit())
            .await?;
        Ok((dbid, session))
    }

    /// Creates one staging object per name in `child_names` that has an
    /// entry in `ddl_by_name`.
    #[instrument(skip_all, fields(scope = %scope, objects = child_names.len()))]
    pub async fn stage(
        &self,
        scope: Scope,
        child_names: &[String],
        ddl_by_name: &HashMap<String, String>,
    ) -> IslandResult<StagingHandle> {
        self.registry.ensure_accepts_immigration(scope, "stage")?;
        let (dbid, mut session) = self.open_session(scope).await?;

        let mut created = Vec::new();
        for (name, ddl) in staged_names(child_names, ddl_by_name) {
            let result: IslandResult<()> = match self.registry.creation_statement(scope, name, ddl) {
                Ok(CreationStatement::Immediate(statement)) => session
                    .execute(&statement)
                    .await
                    .map(|_| ())
                    .map_err(Into::into),
                Ok(CreationStatement::Deferred { name }) => session
                    .create_object_by_name(&name)
                    .await
                    .map_err(Into::into),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                warn!(object = name, error = %e, "Staging failed, dropping objects created so far");
                rollback(&mut *session, &created).await;
                if let Err(close) = session.close().await {
                    warn!(error = %close, "Failed to close staging session");
                }
                return Err(e);
            }
            debug!(object = name, "Staged object");
            created.push(name.to_string());
        }

        info!(dbid = %dbid, created = created.len(), "Staging complete");
        Ok(StagingHandle {
            scope,
            dbid,
            session,
            created,
        })
    }

    /// Drops the staging objects for the same arguments given to `stage`.
    /// Without a handle a new session is opened. A failed drop does not stop
    /// the others.
    #[instrument(skip_all, fields(scope = %scope, objects = child_names.len()))]
    pub async fn unstage(
        &self,
        scope: Scope,
        handle: Option<StagingHandle>,
        child_names: &[String],
        ddl_by_name: &HashMap<String, String>,
    ) -> IslandResult<()> {
        self.registry.ensure_accepts_immigration(scope, "unstage")?;
        let mut session = match handle {
            Some(handle) => handle.session,
            None => self.open_session(scope).await?.1,
        };

        // Every name is attempted; the first failure is reported.
        let mut outcome = Ok(());
        for (name, _) in staged_names(child_names, ddl_by_name) {
            match session.drop_object_if_exists(name).await {
                Ok(()) => debug!(object = name, "Dropped staging object"),
                Err(e) => {
                    warn!(object = name, error = %e, "Failed to drop staging object");
                    if outcome.is_ok() {
                        outcome = Err(e.into());
                    }
                }
            }
        }
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close staging session");
        }
        outcome
    }
}

async fn rollback(session: &mut dyn EngineSession, created: &[String]) {
    for name in created.iter().rev() {
        if let Err(e) = session.drop_object_if_exists(name).await {
            warn!(object = %name, error = %e, "Failed to drop staged object during rollback");
        }
    }
}
