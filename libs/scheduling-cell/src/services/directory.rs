use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::models::{ClinicLocation, SchedulingError};
use crate::services::dentalink::DentalinkClient;

/// Injected time source so cache expiry is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolved branch/dentist mappings, valid for one cache interval.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub location_by_branch: HashMap<i64, ClinicLocation>,
    pub branch_by_location: HashMap<ClinicLocation, i64>,
    pub default_dentist_id: Option<i64>,
}

impl DirectorySnapshot {
    pub fn branch_for(&self, location: ClinicLocation) -> Option<i64> {
        self.branch_by_location
            .get(&location)
            .copied()
            .or_else(|| self.branch_by_location.values().next().copied())
    }

    pub fn location_for(&self, branch_id: i64) -> ClinicLocation {
        self.location_by_branch
            .get(&branch_id)
            .copied()
            .unwrap_or(ClinicLocation::Rodadero)
    }
}

struct CachedSnapshot {
    snapshot: DirectorySnapshot,
    fetched_at: DateTime<Utc>,
}

/// Branch/dentist directory with an explicit get-or-refresh cache.
///
/// Owned state with an injected clock replaces the module-global TTL cache
/// of the original deployment, whose contents silently diverged across
/// serverless instances.
pub struct ClinicDirectory {
    client: DentalinkClient,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    dentist_override: Option<i64>,
    cached: RwLock<Option<CachedSnapshot>>,
}

impl ClinicDirectory {
    const DEFAULT_TTL_MINUTES: i64 = 60;

    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: DentalinkClient::new(config),
            clock,
            ttl: Duration::minutes(Self::DEFAULT_TTL_MINUTES),
            dentist_override: config.dentalink_default_dentist_id,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached snapshot, refreshing from Dentalink when stale.
    pub async fn get_or_refresh(&self) -> Result<DirectorySnapshot, SchedulingError> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if self.clock.now() - cached.fetched_at < self.ttl {
                    return Ok(cached.snapshot.clone());
                }
            }
        }

        let snapshot = self.fetch().await?;

        let mut guard = self.cached.write().await;
        *guard = Some(CachedSnapshot {
            snapshot: snapshot.clone(),
            fetched_at: self.clock.now(),
        });

        Ok(snapshot)
    }

    async fn fetch(&self) -> Result<DirectorySnapshot, SchedulingError> {
        debug!("Fetching Dentalink directory (sucursales, dentistas)");

        let branches = self.client.list_branches().await?;
        let dentists = self.client.list_dentists().await?;

        let mut location_by_branch = HashMap::new();
        let mut branch_by_location = HashMap::new();
        for branch in &branches {
            let location = ClinicLocation::from_branch_name(&branch.nombre);
            location_by_branch.insert(branch.id, location);
            branch_by_location.insert(location, branch.id);
            debug!("Branch mapping: {} ({}) -> {}", branch.id, branch.nombre, location);
        }

        let default_dentist_id = self.dentist_override.or_else(|| {
            // Prefer the lead dentist; otherwise take the first one listed.
            dentists
                .iter()
                .find(|dentist| {
                    let nombre = dentist.nombre.as_deref().unwrap_or("").to_lowercase();
                    let email = dentist.email.as_deref().unwrap_or("").to_lowercase();
                    nombre.contains("albeiro")
                        || email.contains("albeiro")
                        || email.contains("dralbeirogarcia")
                })
                .or_else(|| dentists.first())
                .map(|dentist| dentist.id)
        });

        if default_dentist_id.is_none() {
            warn!("No dentist available in Dentalink; agenda queries will be skipped");
        }

        info!(
            "Dentalink directory loaded: {} branches, {} dentists, default dentist {:?}",
            branches.len(),
            dentists.len(),
            default_dentist_id
        );

        Ok(DirectorySnapshot {
            location_by_branch,
            branch_by_location,
            default_dentist_id,
        })
    }
}
