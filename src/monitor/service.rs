use std::{collections::HashSet, time::Duration};

use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    alerts::{AlertKind, AlertLog, NewAlert},
    dashboard::{Banner, DashboardAggregator, DashboardHandle, DashboardSnapshot},
};

const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Watches one owner's dashboard, logs banner changes and appends an alert
/// log entry whenever a plant enters a category list while push
/// notifications are enabled.
pub struct AlertMonitor {
    owner: String,
    dashboard: DashboardAggregator,
    alerts: AlertLog,
}

impl AlertMonitor {
    pub fn new(owner: impl Into<String>, dashboard: DashboardAggregator, alerts: AlertLog) -> Self {
        Self {
            owner: owner.into(),
            dashboard,
            alerts,
        }
    }

    /// Runs until the dashboard stream ends.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        let mut handle = self.start().await;
        info!(owner = %self.owner, "Alert monitor started");

        let mut state = MonitorState::default();
        self.observe(&mut state, &handle.current()).await;
        while let Some(snapshot) = handle.changed().await {
            self.observe(&mut state, &snapshot).await;
        }
        warn!(owner = %self.owner, "Dashboard stream ended; alert monitor stopping");
    }

    async fn start(&self) -> DashboardHandle {
        loop {
            match self.dashboard.spawn(&self.owner).await {
                Ok(handle) => return handle,
                Err(e) => {
                    error!(owner = %self.owner, error = %e, "Could not start dashboard; retrying");
                    time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    async fn observe(&self, state: &mut MonitorState, snapshot: &DashboardSnapshot) {
        let update = state.advance(snapshot);

        if update.banners_changed {
            info!(owner = %self.owner, banners = ?snapshot.banners, "Dashboard banners changed");
        }
        if !snapshot.notifications_enabled {
            return;
        }
        for alert in update.entered {
            if let Err(e) = self.alerts.push(&self.owner, alert, snapshot.generated_at).await {
                error!(owner = %self.owner, error = %e, "Failed to append alert");
            }
        }
    }
}

/// What changed between two consecutive snapshots.
#[derive(Debug, Default)]
struct Update {
    banners_changed: bool,
    entered: Vec<NewAlert>,
}

#[derive(Debug, Default)]
struct MonitorState {
    banners: Option<Vec<Banner>>,
    active: HashSet<(Uuid, AlertKind)>,
}

impl MonitorState {
    fn advance(&mut self, snapshot: &DashboardSnapshot) -> Update {
        let banners_changed = self.banners.as_ref() != Some(&snapshot.banners);
        self.banners = Some(snapshot.banners.clone());

        let mut active = HashSet::new();
        let mut entered = Vec::new();
        for (kind, plant) in snapshot.alerts.entries() {
            let key = (plant.plant_id, kind);
            if !self.active.contains(&key) {
                entered.push(NewAlert {
                    plant_id: plant.plant_id,
                    plant_name: plant.plant_name.clone(),
                    kind,
                    message: plant.message.clone(),
                });
            }
            active.insert(key);
        }
        self.active = active;

        Update {
            banners_changed,
            entered,
        }
    }
}
