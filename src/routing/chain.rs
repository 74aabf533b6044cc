//! Ordered validator chains.
//!
//! A route carries two chains: access validators run against the caller's
//! identity, path validators against the resolved target. Both short-circuit on
//! the first deny.

use std::path::Path;
use std::sync::Arc;

use crate::http::response::Rejection;
use crate::security::access_control::{AccessValidator, Identity};
use crate::security::path_validation::PathValidator;

#[derive(Clone, Default)]
pub struct ValidatorChain {
    access: Vec<Arc<dyn AccessValidator>>,
    path: Vec<Arc<dyn PathValidator>>,
}

impl ValidatorChain {
    pub fn new(access: Vec<Arc<dyn AccessValidator>>, path: Vec<Arc<dyn PathValidator>>) -> Self {
        Self { access, path }
    }

    pub fn push_access(&mut self, validator: Arc<dyn AccessValidator>) {
        self.access.push(validator);
    }

    pub fn push_path(&mut self, validator: Arc<dyn PathValidator>) {
        self.path.push(validator);
    }

    pub fn access_len(&self) -> usize {
        self.access.len()
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn check_access(&self, identity: &Identity) -> Result<(), Rejection> {
        self.access.iter().try_for_each(|v| v.validate(identity))
    }

    pub fn check_path(&self, target: &Path) -> Result<(), Rejection> {
        self.path.iter().try_for_each(|v| v.validate(target))
    }
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("access", &self.access.len())
            .field("path", &self.path.len())
            .finish()
    }
}
