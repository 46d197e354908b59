//! Agent catalog: maps agent types to the factories that build them.
//!
//! The catalog is populated at startup and then shared read-only with the
//! executor. Adding an agent type means registering a factory; the executor
//! itself never changes.

use crate::error::{RuntimeError, RuntimeResult};
use overseer_core::{Agent, AgentError, AgentRegistration, AgentType};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an agent for one registration.
pub trait AgentFactory: Send + Sync {
    /// Construct (or hand out a shared) agent for `registration`.
    fn create(&self, registration: &AgentRegistration) -> Result<Arc<dyn Agent>, AgentError>;
}

impl<F> AgentFactory for F
where
    F: Fn(&AgentRegistration) -> Result<Arc<dyn Agent>, AgentError> + Send + Sync,
{
    fn create(&self, registration: &AgentRegistration) -> Result<Arc<dyn Agent>, AgentError> {
        self(registration)
    }
}

/// Factory that returns the same agent instance every time.
struct SharedAgent(Arc<dyn Agent>);

impl AgentFactory for SharedAgent {
    fn create(&self, _registration: &AgentRegistration) -> Result<Arc<dyn Agent>, AgentError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Table of agent factories keyed by agent type.
#[derive(Default, Clone)]
pub struct AgentCatalog {
    factories: HashMap<AgentType, Arc<dyn AgentFactory>>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the type.
    pub fn register(&mut self, agent_type: AgentType, factory: Arc<dyn AgentFactory>) -> &mut Self {
        self.factories.insert(agent_type, factory);
        self
    }

    /// Register a closure factory.
    pub fn register_fn<F>(&mut self, agent_type: AgentType, factory: F) -> &mut Self
    where
        F: Fn(&AgentRegistration) -> Result<Arc<dyn Agent>, AgentError> + Send + Sync + 'static,
    {
        self.register(agent_type, Arc::new(factory))
    }

    /// Register one agent instance shared by every registration of the type.
    pub fn register_agent(&mut self, agent_type: AgentType, agent: Arc<dyn Agent>) -> &mut Self {
        self.register(agent_type, Arc::new(SharedAgent(agent)))
    }

    /// Builder-style [`Self::register_agent`].
    pub fn with_agent(mut self, agent_type: AgentType, agent: Arc<dyn Agent>) -> Self {
        self.register_agent(agent_type, agent);
        self
    }

    pub fn supports(&self, agent_type: &AgentType) -> bool {
        self.factories.contains_key(agent_type)
    }

    /// Registered agent types, sorted.
    pub fn supported_types(&self) -> Vec<AgentType> {
        let mut types: Vec<_> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build the agent for `registration`.
    pub fn resolve(&self, registration: &AgentRegistration) -> RuntimeResult<Arc<dyn Agent>> {
        let factory = self
            .factories
            .get(&registration.agent_type)
            .ok_or_else(|| RuntimeError::UnknownAgentType(registration.agent_type.clone()))?;
        factory
            .create(registration)
            .map_err(|e| RuntimeError::AgentConstruction {
                agent_type: registration.agent_type.clone(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for AgentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCatalog")
            .field("types", &self.supported_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use overseer_core::{
        AgentInput, AgentOutput, AgentStatus, ConfigMap, OwnerId, RegistrationId,
    };

    struct Fixed(&'static str);

    #[async_trait]
    impl Agent for Fixed {
        async fn run(&self, _input: AgentInput) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::success(self.0))
        }
    }

    fn registration(agent_type: &str, config: ConfigMap) -> AgentRegistration {
        AgentRegistration {
            id: RegistrationId::generate(),
            owner: OwnerId::parse("u1").unwrap(),
            parent_id: None,
            agent_type: AgentType::parse(agent_type).unwrap(),
            config,
            triggers: Vec::new(),
            stop_conditions: Vec::new(),
            created_at: Utc::now(),
            expires_at: None,
            status: AgentStatus::Active,
            max_invocations: 1,
            invocation_count: 0,
            in_flight: 0,
            max_children: 0,
            children: Vec::new(),
            last_invoked_at: None,
            last_result: None,
        }
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let catalog =
            AgentCatalog::new().with_agent(AgentType::parse("scout").unwrap(), Arc::new(Fixed("s")));

        assert!(catalog.resolve(&registration("scout", ConfigMap::new())).is_ok());
        let err = catalog
            .resolve(&registration("ghost", ConfigMap::new()))
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::UnknownAgentType(_)));
    }

    #[test]
    fn test_closure_factory_sees_config() {
        let mut catalog = AgentCatalog::new();
        catalog.register_fn(AgentType::parse("picky").unwrap(), |reg| {
            if reg.config.contains_key("topic") {
                Ok(Arc::new(Fixed("ok")) as Arc<dyn Agent>)
            } else {
                Err(AgentError::InvalidInput("topic is required".to_string()))
            }
        });

        let err = catalog
            .resolve(&registration("picky", ConfigMap::new()))
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::AgentConstruction { .. }));

        let mut config = ConfigMap::new();
        config.insert("topic".to_string(), "rust".into());
        assert!(catalog.resolve(&registration("picky", config)).is_ok());
    }

    #[test]
    fn test_supported_types_sorted() {
        let catalog = AgentCatalog::new()
            .with_agent(AgentType::parse("writer").unwrap(), Arc::new(Fixed("w")))
            .with_agent(AgentType::parse("analyst").unwrap(), Arc::new(Fixed("a")));
        let names: Vec<_> = catalog
            .supported_types()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(names, vec!["analyst", "writer"]);
        assert!(catalog.supports(&AgentType::parse("writer").unwrap()));
    }
}
