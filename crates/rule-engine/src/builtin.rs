use gatehouse_core_types::{Context, User};
use serde_json::Value;
use tracing::trace;

use crate::errors::RuleFailure;
use crate::model::Record;
use crate::rule::Rule;

/// Returns every item unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughRule;

impl<T> Rule<T> for PassThroughRule {
    fn apply(&self, item: T, _user: &User, _context: &Context) -> Result<Option<T>, RuleFailure> {
        Ok(Some(item))
    }
}

/// Drops every item.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAllRule;

impl<T> Rule<T> for DenyAllRule {
    fn apply(&self, _item: T, _user: &User, _context: &Context) -> Result<Option<T>, RuleFailure> {
        Ok(None)
    }
}

/// Keeps the item only when the user holds `role`.
#[derive(Clone, Debug)]
pub struct RequireRole {
    role: String,
}

impl RequireRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl<T> Rule<T> for RequireRole {
    fn apply(&self, item: T, user: &User, _context: &Context) -> Result<Option<T>, RuleFailure> {
        if user.has_role(&self.role) {
            Ok(Some(item))
        } else {
            trace!(user = %user.user_id, role = %self.role, "user lacks required role");
            Ok(None)
        }
    }
}

/// Keeps the item only when the request context declares `purpose`.
#[derive(Clone, Debug)]
pub struct RequirePurpose {
    purpose: String,
}

impl RequirePurpose {
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
        }
    }
}

impl<T> Rule<T> for RequirePurpose {
    fn apply(&self, item: T, _user: &User, context: &Context) -> Result<Option<T>, RuleFailure> {
        if context.purpose() == Some(self.purpose.as_str()) {
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }
}

/// Replaces a record field with `null`, leaving the key present.
#[derive(Clone, Debug)]
pub struct MaskField {
    field: String,
}

impl MaskField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Rule<Record> for MaskField {
    fn apply(
        &self,
        mut item: Record,
        _user: &User,
        _context: &Context,
    ) -> Result<Option<Record>, RuleFailure> {
        if item.contains(&self.field) {
            item.set(self.field.clone(), Value::Null);
        }
        Ok(Some(item))
    }
}

/// Removes a record field entirely.
#[derive(Clone, Debug)]
pub struct RedactField {
    field: String,
}

impl RedactField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl Rule<Record> for RedactField {
    fn apply(
        &self,
        mut item: Record,
        _user: &User,
        _context: &Context,
    ) -> Result<Option<Record>, RuleFailure> {
        item.remove(&self.field);
        Ok(Some(item))
    }
}
