//! Checks applied to create/dispatch requests before they reach the store.

use serde::Deserialize;
use serde_json::Value;

use crate::cron::parse_standard_cron;
use crate::error::{Result, SchedulerError};
use crate::registry::TaskRegistry;
use crate::types::NewPeriodicTask;

/// Request to create a periodic task.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodicTaskRequest {
    pub name: String,
    pub cron: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl PeriodicTaskRequest {
    pub fn validate(&self, registry: &TaskRegistry) -> Result<()> {
        validate_name(&self.name, registry)?;
        if self.cron.trim().is_empty() {
            return Err(SchedulerError::Validation("cron required".to_string()));
        }
        parse_standard_cron(&self.cron)
            .map_err(|e| SchedulerError::Validation(format!("cron invalid: {e}")))?;
        Ok(())
    }

    /// Validate and convert into a store insert.
    pub fn into_new_task(self, registry: &TaskRegistry) -> Result<NewPeriodicTask> {
        self.validate(registry)?;
        Ok(NewPeriodicTask {
            name: self.name,
            cron: self.cron,
            args: self.args,
        })
    }
}

/// Request to dispatch a one-shot task.
#[derive(Debug, Clone, Deserialize)]
pub struct OneShotRequest {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl OneShotRequest {
    pub fn validate(&self, registry: &TaskRegistry) -> Result<()> {
        validate_name(&self.name, registry)
    }
}

fn validate_name(name: &str, registry: &TaskRegistry) -> Result<()> {
    if name.is_empty() {
        return Err(SchedulerError::Validation("task name required".to_string()));
    }
    if !registry.contains(name) {
        return Err(SchedulerError::Validation(format!(
            "task name {name} invalid (registered: {})",
            registry.names().join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn periodic(name: &str, cron: &str) -> PeriodicTaskRequest {
        PeriodicTaskRequest {
            name: name.to_string(),
            cron: cron.to_string(),
            args: vec![json!(10)],
        }
    }

    #[test]
    fn accepts_valid_periodic_request() {
        let registry = TaskRegistry::builtin();
        let task = periodic("CalcFib", "*/5 * * * *")
            .into_new_task(&registry)
            .unwrap();
        assert_eq!(task.name, "CalcFib");
        assert_eq!(task.args, vec![json!(10)]);

        for cron in ["0 0 * * 0", "0 9 * * 1-5", "@hourly"] {
            periodic("CalcFib", cron).validate(&registry).unwrap();
        }
    }

    #[test]
    fn rejects_periodic_request_problems() {
        let registry = TaskRegistry::builtin();
        for (name, cron) in [
            ("", "* * * * *"),
            ("NoSuchTask", "* * * * *"),
            ("CalcFib", ""),
            ("CalcFib", "not-a-cron"),
            ("CalcFib", "* * * * * *"),
            ("CalcFib", "0 0 0 1 1 * 2030"),
        ] {
            let err = periodic(name, cron).validate(&registry).unwrap_err();
            assert!(matches!(err, SchedulerError::Validation(_)), "{name:?} {cron:?}");
        }
    }

    #[test]
    fn one_shot_request_from_json() {
        let registry = TaskRegistry::builtin();
        let req: OneShotRequest = serde_json::from_value(json!({"name": "CalcFib"})).unwrap();
        assert!(req.args.is_empty());
        req.validate(&registry).unwrap();

        let req: OneShotRequest = serde_json::from_value(json!({"name": "Nope"})).unwrap();
        assert!(req.validate(&registry).is_err());
    }
}
