//! Registry pattern for looking up steppers by name

use super::{Leapfrog, SymplecticStepper, Yoshida4, Yoshida6, Yoshida8};
use crate::error::{ChainstepError, Result};
use std::collections::HashMap;

/// Name and alias lookup for the available steppers
#[derive(Debug, Clone)]
pub struct StepperRegistry {
    steppers: Vec<Box<dyn SymplecticStepper>>,
    aliases: HashMap<String, String>,
}

impl StepperRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            steppers: Vec::new(),
            aliases: HashMap::new(),
        };

        registry.register(Box::new(Leapfrog));
        registry.register(Box::new(Yoshida4));
        registry.register(Box::new(Yoshida6));
        registry.register(Box::new(Yoshida8));

        registry
    }

    /// Add a stepper along with the aliases it declares
    pub fn register(&mut self, stepper: Box<dyn SymplecticStepper>) {
        for alias in stepper.aliases() {
            self.add_alias(alias, stepper.name());
        }
        self.steppers.retain(|s| s.name() != stepper.name());
        self.steppers.push(stepper);
    }

    pub fn add_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn SymplecticStepper>> {
        let resolved_name = self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name);

        match self.steppers.iter().find(|s| s.name() == resolved_name) {
            Some(stepper) => Ok(stepper.clone_box()),
            None => {
                let aliases: Vec<String> = self
                    .list_aliases()
                    .into_iter()
                    .map(|(alias, _)| alias)
                    .collect();
                Err(ChainstepError::UnknownStepper(format!(
                    "Unknown stepper: '{}'. Available steppers: {}. Aliases: {}",
                    name,
                    self.list_available().join(", "),
                    aliases.join(", ")
                )))
            }
        }
    }

    /// The stepper of the given order
    pub fn create_by_order(&self, order: usize) -> Result<Box<dyn SymplecticStepper>> {
        self.steppers
            .iter()
            .find(|s| s.order() == order)
            .map(|s| s.clone_box())
            .ok_or_else(|| {
                let orders: Vec<String> =
                    self.steppers.iter().map(|s| s.order().to_string()).collect();
                ChainstepError::UnknownStepper(format!(
                    "No stepper of order {order}. Available orders: {}",
                    orders.join(", ")
                ))
            })
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn SymplecticStepper> {
        self.steppers.iter().map(|s| s.as_ref())
    }

    pub fn list_available(&self) -> Vec<String> {
        self.steppers.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn list_aliases(&self) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = self
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        aliases.sort_by(|a, b| a.0.cmp(&b.0));
        aliases
    }
}

impl Default for StepperRegistry {
    fn default() -> Self {
        Self::new()
    }
}
