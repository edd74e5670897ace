use crate::descriptor::ClassDescriptor;

/// Functional category assigned to a type by the role rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// HTTP endpoint, controller, or other externally triggered entry.
    EntryPoint,
    /// Command or query message dispatched through a mediator.
    Message,
    /// Handles exactly one message type.
    Handler,
    Repository,
    /// Aggregate root or other persisted domain entity.
    Entity,
    Service,
    Validator,
    /// Pipeline behaviour / middleware attached to every request.
    Middleware,
    /// Persistence or framework configuration.
    Configuration,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::EntryPoint => "entry_point",
            Role::Message => "message",
            Role::Handler => "handler",
            Role::Repository => "repository",
            Role::Entity => "entity",
            Role::Service => "service",
            Role::Validator => "validator",
            Role::Middleware => "middleware",
            Role::Configuration => "configuration",
            Role::Other => "other",
        }
    }
}

/// Architectural tier a type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Presentation,
    Application,
    Domain,
    Infrastructure,
    Test,
    Unknown,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Presentation => "presentation",
            Layer::Application => "application",
            Layer::Domain => "domain",
            Layer::Infrastructure => "infrastructure",
            Layer::Test => "test",
            Layer::Unknown => "unknown",
        }
    }
}

/// A classified type: its descriptor plus role, project and layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassNode {
    pub descriptor: ClassDescriptor,
    pub role: Role,
    pub project: String,
    pub layer: Layer,
}

impl ClassNode {
    pub fn key(&self) -> String {
        self.descriptor.key()
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn file(&self) -> &str {
        &self.descriptor.file
    }
}

/// A node in the dependency graph: a known type, or the placeholder target of an edge
/// whose type has not (yet) been added.
#[derive(Debug, Clone, serde::Serialize)]
pub enum GraphNode {
    Class(ClassNode),
    /// Referenced but not declared in the descriptor stream. `key` is the reference as
    /// resolved so far: a qualified key when one is known, otherwise the short name.
    Unresolved { key: String },
}

impl GraphNode {
    pub fn key(&self) -> String {
        match self {
            GraphNode::Class(c) => c.key(),
            GraphNode::Unresolved { key } => key.clone(),
        }
    }

    pub fn as_class(&self) -> Option<&ClassNode> {
        match self {
            GraphNode::Class(c) => Some(c),
            GraphNode::Unresolved { .. } => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, GraphNode::Unresolved { .. })
    }
}
