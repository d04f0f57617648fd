// # Route Reconciler
//
// Routes are identified by the id Mailgun assigns on create. Every field but
// the region is mutable; an update sends one partial PUT per changed field.

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Reconcile, already_deleted_ok};
use crate::config::PollConfig;
use crate::diff::{Differ, Plan, UpdateOutcome};
use crate::error::{Error, Result, ResultExt};
use crate::model::{Region, ResourceKind, RouteSpec, RouteState};
use crate::poll::{PollOutcome, PollPolicy, Presence, confirm_absent};
use crate::traits::{ClientSet, Route, RouteOptions};

/// In-place change to a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMutation {
    Priority(i64),
    Description(String),
    Expression(String),
    Actions(Vec<String>),
}

impl RouteMutation {
    /// Partial update carrying only this field
    pub fn to_options(&self) -> RouteOptions {
        let mut options = RouteOptions::default();
        match self {
            RouteMutation::Priority(priority) => options.priority = Some(*priority),
            RouteMutation::Description(description) => {
                options.description = Some(description.clone())
            }
            RouteMutation::Expression(expression) => options.expression = Some(expression.clone()),
            RouteMutation::Actions(actions) => options.actions = Some(actions.clone()),
        }
        options
    }
}

/// Reconciler for `mailgun_route`
#[derive(Debug, Clone)]
pub struct RouteResource {
    poll: PollPolicy,
}

impl RouteResource {
    pub fn new(poll: PollPolicy) -> Self {
        Self { poll }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.policy_for(ResourceKind::Route))
    }
}

fn to_state(region: Region, route: Route) -> RouteState {
    RouteState {
        id: route.id,
        region,
        priority: route.priority,
        description: route.description,
        expression: route.expression,
        actions: route.actions,
        created_at: Some(route.created_at).filter(|at| !at.is_empty()),
    }
}

#[async_trait]
impl Reconcile for RouteResource {
    type Spec = RouteSpec;
    type State = RouteState;
    type Mutation = RouteMutation;

    const KIND: ResourceKind = ResourceKind::Route;

    async fn create(&self, clients: &ClientSet, spec: &RouteSpec) -> Result<RouteState> {
        spec.validate()?;
        let api = clients.for_region(spec.region)?;

        let options = RouteOptions {
            priority: Some(spec.priority),
            description: Some(spec.description.clone()),
            expression: Some(spec.expression.clone()),
            actions: Some(spec.actions.clone()),
        };
        let created = api
            .create_route(&options)
            .await
            .context(|| format!("creating route for {}", spec.expression))?;

        tracing::info!("Route ID: {}", created.id);

        let id = created.id;
        api.get_route(&id)
            .await
            .context(|| format!("reading back route {}", id))?
            .map(|route| to_state(spec.region, route))
            .ok_or_else(|| Error::not_found(format!("route {} vanished after create", id)))
    }

    async fn read(&self, clients: &ClientSet, prior: &RouteState) -> Result<Option<RouteState>> {
        let api = clients.for_region(prior.region)?;
        let route = api
            .get_route(&prior.id)
            .await
            .context(|| format!("reading route {}", prior.id))?;
        Ok(route.map(|route| to_state(prior.region, route)))
    }

    fn plan(&self, current: &RouteState, spec: &RouteSpec) -> Plan<RouteMutation> {
        Differ::new()
            .force_new("region", &current.region, &spec.region)
            .mutable("priority", &current.priority, &spec.priority, |p| {
                RouteMutation::Priority(*p)
            })
            .mutable(
                "description",
                current.description.as_str(),
                spec.description.as_str(),
                |d| RouteMutation::Description(d.to_string()),
            )
            .mutable(
                "expression",
                current.expression.as_str(),
                spec.expression.as_str(),
                |e| RouteMutation::Expression(e.to_string()),
            )
            .mutable("actions", &current.actions, &spec.actions, |a| {
                RouteMutation::Actions(a.clone())
            })
            .finish()
    }

    async fn update(
        &self,
        clients: &ClientSet,
        prior: &RouteState,
        spec: &RouteSpec,
    ) -> Result<UpdateOutcome<RouteState>> {
        spec.validate()?;

        let current = self
            .read(clients, prior)
            .await?
            .ok_or_else(|| Error::not_found(format!("route {}", prior.id)))?;

        let plan = self.plan(&current, spec);
        if plan.requires_replacement() {
            return Ok(UpdateOutcome::ReplacementRequired(plan.replace));
        }
        if plan.is_noop() {
            return Ok(UpdateOutcome::Unchanged(current));
        }

        let api = clients.for_region(current.region)?;
        let id = current.id.as_str();
        for (field, mutation) in plan.changed.iter().zip(&plan.mutations) {
            tracing::debug!("Updating {} of route {}", field, id);
            api.update_route(id, &mutation.to_options())
                .await
                .context(|| format!("updating {} of route {}", field, id))?;
        }

        self.read(clients, &current)
            .await?
            .map(UpdateOutcome::Updated)
            .ok_or_else(|| Error::not_found(format!("route {} vanished during update", id)))
    }

    async fn delete(
        &self,
        clients: &ClientSet,
        state: &RouteState,
        deadline: Option<Instant>,
    ) -> Result<PollOutcome> {
        let api = clients.for_region(state.region)?;
        let id = state.id.as_str();

        tracing::info!("Deleting route {}", id);
        already_deleted_ok(api.delete_route(id).await, id)
            .context(|| format!("deleting route {}", id))?;

        confirm_absent(id, &self.poll, deadline, move || async move {
            api.get_route(id).await.map(|found| Presence::of(&found))
        })
        .await
        .context(|| format!("waiting for route {} to disappear", id))
    }

    async fn import(&self, clients: &ClientSet, raw_id: &str) -> Result<RouteState> {
        let (region, id) = RouteSpec::key_from_import(raw_id)?;
        let api = clients.for_region(region)?;

        api.get_route(&id)
            .await
            .context(|| format!("importing route {}", id))?
            .map(|route| to_state(region, route))
            .ok_or_else(|| {
                Error::not_found(format!("route {} does not exist in region {}", id, region))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state() -> RouteState {
        RouteState {
            id: "5d9fde0fd8b861ec16cf2549".to_string(),
            region: Region::Us,
            priority: 0,
            description: "inbound".to_string(),
            expression: "match_recipient('.*@example.com')".to_string(),
            actions: vec!["forward('http://example.com/inbound')".to_string()],
            created_at: None,
        }
    }

    fn resource() -> RouteResource {
        RouteResource::new(PollPolicy::fixed(Duration::from_secs(60), Duration::from_secs(1)))
    }

    #[test]
    fn one_mutation_per_changed_field() {
        let spec = RouteSpec::new(
            5,
            "match_recipient('.*@example.com')",
            vec!["forward('http://example.com/inbound')".to_string(), "stop()".to_string()],
        )
        .with_description("inbound");

        let plan = resource().plan(&state(), &spec);
        assert_eq!(plan.changed, vec!["priority", "actions"]);
        assert_eq!(plan.mutations.len(), 2);
        assert_eq!(plan.mutations[0].to_options().priority, Some(5));
        assert_eq!(plan.mutations[0].to_options().actions, None);
    }

    #[test]
    fn region_change_requires_replacement() {
        let spec = RouteSpec::new(
            0,
            "match_recipient('.*@example.com')",
            vec!["forward('http://example.com/inbound')".to_string()],
        )
        .with_description("inbound")
        .with_region(Region::Eu);

        let plan = resource().plan(&state(), &spec);
        assert_eq!(plan.replace, vec!["region"]);
    }

    #[test]
    fn empty_created_at_is_dropped() {
        let route = Route {
            id: "r1".to_string(),
            created_at: String::new(),
            ..Default::default()
        };
        assert_eq!(to_state(Region::Us, route).created_at, None);
    }
}
