//! Desired-state differ
//!
//! Compares a freshly read remote entity against the desired configuration,
//! field by field. Mutable fields that differ become one mutation each; a
//! differing force-new field marks the whole entity for replacement, which is
//! left to the caller.
//!
//! ```
//! use mailgun_core::diff::Differ;
//!
//! #[derive(Debug, PartialEq)]
//! enum Change {
//!     OpenTracking(bool),
//! }
//!
//! let plan = Differ::new()
//!     .force_new("wildcard", &true, &true)
//!     .mutable("open_tracking", &false, &true, |v| Change::OpenTracking(*v))
//!     .finish();
//!
//! assert!(!plan.requires_replacement());
//! assert_eq!(plan.mutations, vec![Change::OpenTracking(true)]);
//! ```

/// Builder collecting the differences between remote and desired state
#[derive(Debug)]
pub struct Differ<M> {
    replace: Vec<&'static str>,
    changed: Vec<&'static str>,
    mutations: Vec<M>,
}

impl<M> Differ<M> {
    pub fn new() -> Self {
        Self {
            replace: Vec::new(),
            changed: Vec::new(),
            mutations: Vec::new(),
        }
    }

    /// Compare a field that cannot be changed in place
    pub fn force_new<T>(mut self, field: &'static str, remote: &T, desired: &T) -> Self
    where
        T: PartialEq + ?Sized,
    {
        if remote != desired {
            self.replace.push(field);
        }
        self
    }

    /// Compare a mutable field; `mutation` receives the desired value
    pub fn mutable<T, F>(mut self, field: &'static str, remote: &T, desired: &T, mutation: F) -> Self
    where
        T: PartialEq + ?Sized,
        F: FnOnce(&T) -> M,
    {
        if remote != desired {
            self.changed.push(field);
            self.mutations.push(mutation(desired));
        }
        self
    }

    pub fn finish(self) -> Plan<M> {
        Plan {
            replace: self.replace,
            changed: self.changed,
            mutations: self.mutations,
        }
    }
}

impl<M> Default for Differ<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a diff
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<M> {
    /// Force-new fields that differ
    pub replace: Vec<&'static str>,
    /// Mutable fields that differ, in the order of `mutations`
    pub changed: Vec<&'static str>,
    /// One remote call each
    pub mutations: Vec<M>,
}

impl<M> Plan<M> {
    pub fn is_noop(&self) -> bool {
        self.replace.is_empty() && self.mutations.is_empty()
    }

    pub fn requires_replacement(&self) -> bool {
        !self.replace.is_empty()
    }
}

/// What an update pass did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<S> {
    /// Remote already matched
    Unchanged(S),
    /// Mutations were applied; carries the state read back afterwards
    Updated(S),
    /// Force-new fields differ; nothing was sent
    ReplacementRequired(Vec<&'static str>),
}

impl<S> UpdateOutcome<S> {
    /// The observed state, unless a replacement is needed
    pub fn into_state(self) -> Option<S> {
        match self {
            UpdateOutcome::Unchanged(state) | UpdateOutcome::Updated(state) => Some(state),
            UpdateOutcome::ReplacementRequired(_) => None,
        }
    }

    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> UpdateOutcome<T> {
        match self {
            UpdateOutcome::Unchanged(state) => UpdateOutcome::Unchanged(f(state)),
            UpdateOutcome::Updated(state) => UpdateOutcome::Updated(f(state)),
            UpdateOutcome::ReplacementRequired(fields) => UpdateOutcome::ReplacementRequired(fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Change {
        Password(String),
        Priority(i64),
    }

    #[test]
    fn equal_values_produce_no_mutation() {
        let plan = Differ::<Change>::new()
            .mutable("priority", &10, &10, |v| Change::Priority(*v))
            .finish();

        assert!(plan.is_noop());
        assert!(plan.mutations.is_empty());
    }

    #[test]
    fn changed_value_produces_one_mutation_with_desired_value() {
        let plan = Differ::new()
            .mutable("password", "old", "new", |v: &str| Change::Password(v.to_string()))
            .mutable("priority", &1, &1, |v| Change::Priority(*v))
            .finish();

        assert_eq!(plan.mutations, vec![Change::Password("new".to_string())]);
        assert_eq!(plan.changed, vec!["password"]);
        assert!(!plan.requires_replacement());
    }

    #[test]
    fn force_new_field_marks_replacement() {
        let plan = Differ::<Change>::new()
            .force_new("spam_action", "disabled", "block")
            .mutable("priority", &1, &2, |v| Change::Priority(*v))
            .finish();

        assert!(plan.requires_replacement());
        assert_eq!(plan.replace, vec!["spam_action"]);
    }

    #[test]
    fn replacement_outcome_has_no_state() {
        let outcome: UpdateOutcome<u8> = UpdateOutcome::ReplacementRequired(vec!["name"]);
        assert_eq!(outcome.into_state(), None);
        assert_eq!(UpdateOutcome::Updated(3).map(|v| v * 2).into_state(), Some(6));
    }
}
