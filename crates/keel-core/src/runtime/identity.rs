use keel_mesos::proto::{FrameworkInfo, Id};
use keel_model::FrameworkState;

use crate::config::Config;

/// Subscription identity; carries the stored framework id for failover.
pub fn framework_info(cfg: &Config, state: &FrameworkState) -> FrameworkInfo {
    let fw = &cfg.framework;
    let hostname = fw
        .hostname
        .clone()
        .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()));

    FrameworkInfo {
        user: fw.user.clone(),
        name: fw.name.clone(),
        id: state.framework_id.as_deref().map(Id::new),
        failover_timeout: Some(fw.failover_timeout_secs),
        checkpoint: Some(fw.checkpoint),
        role: Some(fw.role.clone()),
        hostname,
        principal: fw.principal.clone(),
        webui_url: fw.webui_url.clone(),
        capabilities: Vec::new(),
    }
}
