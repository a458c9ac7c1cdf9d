use crate::{Config, ConfigCondition, ConfigStatus, InstallStatus};

impl ConfigStatus {
    /// Returns the condition describing the current state, if any.
    pub fn current(&self) -> Option<&ConfigCondition> {
        self.conditions.first()
    }

    /// Records a new outcome. The condition becomes the head of the
    /// history and every previous entry is kept as is.
    pub fn prepend(&mut self, condition: ConfigCondition) {
        self.conditions.insert(0, condition);
    }
}

impl Config {
    /// Returns the condition describing the current state, if any.
    pub fn current_condition(&self) -> Option<&ConfigCondition> {
        self.status.as_ref().and_then(|s| s.current())
    }

    /// Code of the head condition. A resource without any
    /// condition is in the [`InstallStatus::Empty`] state.
    pub fn install_status(&self) -> InstallStatus {
        self.current_condition()
            .map_or(InstallStatus::Empty, |c| c.code)
    }

    /// Returns the operator identifier recorded in the status.
    pub fn operator_uuid(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.operator_uuid.as_deref())
            .unwrap_or("")
    }

    /// Returns true if the head condition reports a completed
    /// installation of the given version.
    pub fn has_installed_version(&self, version: &str) -> bool {
        self.current_condition()
            .map_or(false, |c| {
                c.code == InstallStatus::Installed && c.version == version
            })
    }

    /// Returns true if the resource is fully installed at `version` by
    /// the operator identified by `uuid`. An empty `uuid` matches any
    /// recorded identifier.
    pub fn is_up_to_date(&self, version: &str, uuid: &str) -> bool {
        self.has_installed_version(version) && (uuid.is_empty() || self.operator_uuid() == uuid)
    }

    /// Returns a copy of the resource with `condition` prepended to
    /// the history and the status stamped with `uuid`.
    pub fn with_condition(&self, condition: ConfigCondition, uuid: &str) -> Config {
        let mut modified = self.clone();
        let status = modified.status.get_or_insert_with(Default::default);
        status.operator_uuid = if uuid.is_empty() {
            status.operator_uuid.take()
        } else {
            Some(uuid.to_owned())
        };
        status.prepend(condition);
        modified
    }
}
