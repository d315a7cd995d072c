//! Service definitions and their registry validation.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use super::command::{route_key, CommandDefinition, HttpMethod};
use super::error::{ConfigurationError, Violation};
use super::info::ServiceInfo;
use super::subscription::SubscriptionDefinition;
use crate::schema::Schema;

/// Everything a service is: identity, configuration contract, commands and
/// subscriptions. Immutable once handed to a runtime.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    info: ServiceInfo,
    config_schema: Schema,
    default_config: Value,
    commands: Vec<CommandDefinition>,
    subscriptions: Vec<SubscriptionDefinition>,
}

impl ServiceDefinition {
    /// A service with an empty object as configuration contract and default.
    pub fn new(info: ServiceInfo) -> Self {
        Self {
            info,
            config_schema: Schema::empty_object(),
            default_config: json!({}),
            commands: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn config(mut self, schema: Schema, default: Value) -> Self {
        self.config_schema = schema;
        self.default_config = default;
        self
    }

    pub fn command(mut self, command: CommandDefinition) -> Self {
        self.commands.push(command);
        self
    }

    pub fn subscription(mut self, subscription: SubscriptionDefinition) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn config_schema(&self) -> &Schema {
        &self.config_schema
    }

    pub fn default_config(&self) -> &Value {
        &self.default_config
    }

    pub fn commands(&self) -> &[CommandDefinition] {
        &self.commands
    }

    pub fn subscriptions(&self) -> &[SubscriptionDefinition] {
        &self.subscriptions
    }

    pub fn find_command(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.iter().find(|c| c.name() == name)
    }

    /// Check every command in isolation, then uniqueness of names and of
    /// HTTP routes within the service.
    pub fn validate_command_definitions(&self) -> Result<(), ConfigurationError> {
        let mut violations: Vec<Violation> =
            self.commands.iter().flat_map(|c| c.violations()).collect();

        let mut names = HashSet::new();
        let mut reported = HashSet::new();
        for command in &self.commands {
            if !names.insert(command.name()) && reported.insert(command.name()) {
                violations.push(Violation::DuplicateCommand(command.name().to_string()));
            }
        }

        let mut routes: HashMap<(HttpMethod, String), &str> = HashMap::new();
        for command in &self.commands {
            let Some(http) = command.http() else { continue };
            let key = (http.method, route_key(&http.path));
            if let Some(first) = routes.insert(key, command.name()) {
                if first != command.name() {
                    violations.push(Violation::DuplicateHttpRoute {
                        method: http.method,
                        path: http.path.clone(),
                        first: format!("`{first}`"),
                        second: format!("`{}`", command.name()),
                    });
                }
            }
        }

        self.result(violations)
    }

    pub fn validate_subscription_definitions(&self) -> Result<(), ConfigurationError> {
        let violations = self
            .subscriptions
            .iter()
            .flat_map(|s| s.violations())
            .collect();
        self.result(violations)
    }

    /// Full registry check: commands, subscriptions and the configuration
    /// contract. Every violation is collected before failing.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        for check in [
            self.validate_command_definitions(),
            self.validate_subscription_definitions(),
        ] {
            if let Err(err) = check {
                violations.extend(err.violations);
            }
        }
        let defects = self.config_schema.defects();
        violations.extend(defects.iter().map(|defect| Violation::MalformedSchema {
            owner: "service".to_string(),
            slot: "config",
            defect: defect.to_string(),
        }));
        if defects.is_empty() {
            if let Err(err) = self.config_schema.validate(&self.default_config) {
                violations.push(Violation::InvalidConfig(err));
            }
        }
        self.result(violations)
    }

    fn result(&self, violations: Vec<Violation>) -> Result<(), ConfigurationError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError {
                service: self.info.to_string(),
                violations,
            })
        }
    }
}
