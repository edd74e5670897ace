use crate::descriptor::{ClassDescriptor, short_name};

use super::node::{Layer, Role};

/// One predicate over a descriptor. Matching is plain string work: no runtime type
/// inspection, so the same descriptor always classifies the same way.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Any base type contains the text (generics included).
    BaseContains(&'static str),
    /// Any implemented interface contains the text.
    ImplementsContains(&'static str),
    /// Any implemented interface's short, generic-free name equals the text.
    ImplementsNamed(&'static str),
    /// Any declared attribute contains the text.
    AttributeContains(&'static str),
    NameSuffix(&'static str),
    NameContains(&'static str),
    /// A directory component of the declaring file equals the text.
    PathSegment(&'static str),
}

impl Matcher {
    pub fn matches(&self, d: &ClassDescriptor) -> bool {
        match *self {
            Matcher::BaseContains(s) => d.base_types.iter().any(|b| b.contains(s)),
            Matcher::ImplementsContains(s) => d.interfaces.iter().any(|i| i.contains(s)),
            Matcher::ImplementsNamed(s) => d.interfaces.iter().any(|i| short_name(i) == s),
            Matcher::AttributeContains(s) => d.attributes.iter().any(|a| a.contains(s)),
            Matcher::NameSuffix(s) => d.name.ends_with(s),
            Matcher::NameContains(s) => d.name.contains(s),
            Matcher::PathSegment(s) => {
                let segments: Vec<&str> = d.file.split(['/', '\\']).collect();
                // Last segment is the file name itself.
                segments
                    .split_last()
                    .is_some_and(|(_, dirs)| dirs.iter().any(|seg| *seg == s))
            }
        }
    }
}

/// A row of the role table.
#[derive(Debug, Clone, Copy)]
pub struct RoleRule {
    pub role: Role,
    pub matcher: Matcher,
}

const fn rule(role: Role, matcher: Matcher) -> RoleRule {
    RoleRule { role, matcher }
}

/// Ordered role table, evaluated top to bottom; the first matching row wins.
pub const ROLE_RULES: &[RoleRule] = &[
    rule(Role::EntryPoint, Matcher::BaseContains("Endpoint")),
    rule(Role::EntryPoint, Matcher::AttributeContains("ApiController")),
    rule(Role::EntryPoint, Matcher::BaseContains("Controller")),
    rule(Role::Message, Matcher::NameSuffix("Command")),
    rule(Role::Message, Matcher::NameSuffix("Query")),
    rule(Role::Message, Matcher::ImplementsNamed("ICommand")),
    rule(Role::Message, Matcher::ImplementsNamed("IQuery")),
    rule(Role::Message, Matcher::ImplementsNamed("IRequest")),
    rule(Role::Validator, Matcher::NameSuffix("Validator")),
    rule(Role::Validator, Matcher::BaseContains("Validator")),
    rule(Role::Middleware, Matcher::ImplementsContains("IPipelineBehavior")),
    rule(Role::Middleware, Matcher::NameSuffix("Behavior")),
    rule(Role::Middleware, Matcher::NameSuffix("Behaviour")),
    rule(Role::Middleware, Matcher::NameSuffix("Middleware")),
    rule(Role::Handler, Matcher::NameSuffix("Handler")),
    rule(Role::Handler, Matcher::ImplementsContains("Handler")),
    rule(Role::Repository, Matcher::ImplementsContains("IRepository")),
    rule(Role::Repository, Matcher::BaseContains("Repository")),
    rule(Role::Repository, Matcher::NameContains("Repository")),
    rule(Role::Entity, Matcher::ImplementsContains("IAggregateRoot")),
    rule(Role::Entity, Matcher::AttributeContains("AggregateRoot")),
    rule(Role::Entity, Matcher::BaseContains("EntityBase")),
    rule(Role::Configuration, Matcher::ImplementsContains("IEntityTypeConfiguration")),
    rule(Role::Configuration, Matcher::NameSuffix("Configuration")),
    rule(Role::Service, Matcher::NameSuffix("Service")),
    rule(Role::EntryPoint, Matcher::PathSegment("Endpoints")),
    rule(Role::EntryPoint, Matcher::PathSegment("Controllers")),
    rule(Role::Entity, Matcher::PathSegment("Entities")),
    rule(Role::Entity, Matcher::PathSegment("Aggregates")),
];

/// Classify a descriptor's role: first matching rule in [`ROLE_RULES`], else `Other`.
pub fn classify_role(d: &ClassDescriptor) -> Role {
    ROLE_RULES
        .iter()
        .find(|r| r.matcher.matches(d))
        .map(|r| r.role)
        .unwrap_or(Role::Other)
}

/// Project-name keywords per layer, checked in this order.
const LAYER_KEYWORDS: &[(Layer, &[&str])] = &[
    (Layer::Test, &["test", "spec"]),
    (Layer::Presentation, &["web", "api", "host", "server"]),
    (Layer::Infrastructure, &["infrastructure", "infra", "data", "persistence"]),
    (Layer::Application, &["usecase", "application"]),
    (Layer::Domain, &["core", "domain", "kernel", "shared"]),
];

/// Classify the architectural layer from the declaring project's name, falling back to
/// what the role implies when the project name says nothing.
pub fn classify_layer(project: &str, role: Role) -> Layer {
    let lower = project.to_lowercase();
    if let Some((layer, _)) = LAYER_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
    {
        return *layer;
    }
    match role {
        Role::EntryPoint => Layer::Presentation,
        Role::Message | Role::Handler | Role::Validator | Role::Middleware => Layer::Application,
        Role::Entity => Layer::Domain,
        Role::Repository | Role::Configuration => Layer::Infrastructure,
        Role::Service | Role::Other => Layer::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> ClassDescriptor {
        ClassDescriptor {
            name: name.into(),
            namespace: String::new(),
            project: String::new(),
            file: String::new(),
            kind: Default::default(),
            base_types: vec![],
            interfaces: vec![],
            constructor_params: vec![],
            attributes: vec![],
            dispatches: vec![],
        }
    }

    #[test]
    fn test_naming_rules() {
        assert_eq!(classify_role(&desc("CreateContributorCommand")), Role::Message);
        assert_eq!(classify_role(&desc("GetContributorQuery")), Role::Message);
        assert_eq!(classify_role(&desc("CreateContributorHandler")), Role::Handler);
        assert_eq!(classify_role(&desc("CreateContributorValidator")), Role::Validator);
        assert_eq!(classify_role(&desc("EfRepository")), Role::Repository);
        assert_eq!(classify_role(&desc("EmailService")), Role::Service);
        assert_eq!(classify_role(&desc("LoggingBehavior")), Role::Middleware);
        assert_eq!(classify_role(&desc("Contributor")), Role::Other);
    }

    #[test]
    fn test_handler_interface_is_not_a_message() {
        let mut d = desc("CreateThing");
        d.interfaces = vec!["ICommandHandler<CreateThingCommand>".into()];
        assert_eq!(classify_role(&d), Role::Handler);

        let mut m = desc("Ping");
        m.interfaces = vec!["IRequest<Pong>".into()];
        assert_eq!(classify_role(&m), Role::Message);
    }

    #[test]
    fn test_rule_order_breaks_ties() {
        // Both an endpoint base type and a Command suffix: the earlier row wins.
        let mut d = desc("CreateCommand");
        d.base_types = vec!["Endpoint<CreateRequest>".into()];
        assert_eq!(classify_role(&d), Role::EntryPoint);
    }

    #[test]
    fn test_interfaces_and_attributes() {
        let mut e = desc("Contributor");
        e.interfaces = vec!["IAggregateRoot".into()];
        assert_eq!(classify_role(&e), Role::Entity);

        let mut c = desc("Contributors");
        c.attributes = vec!["ApiController".into()];
        assert_eq!(classify_role(&c), Role::EntryPoint);

        let mut cfg = desc("ContributorMap");
        cfg.interfaces = vec!["IEntityTypeConfiguration<Contributor>".into()];
        assert_eq!(classify_role(&cfg), Role::Configuration);
    }

    #[test]
    fn test_path_segment_rules() {
        let mut d = desc("Create");
        d.file = "src/Web/Endpoints/Create.cs".into();
        assert_eq!(classify_role(&d), Role::EntryPoint);

        let mut e = desc("Project");
        e.file = "src\\Core\\Aggregates\\Project.cs".into();
        assert_eq!(classify_role(&e), Role::Entity);

        let mut f = desc("Endpoints");
        f.file = "src/Endpoints".into();
        assert_eq!(classify_role(&f), Role::Other, "file name is not a directory segment");
    }

    #[test]
    fn test_layers() {
        assert_eq!(classify_layer("Clean.Architecture.Web", Role::Other), Layer::Presentation);
        assert_eq!(classify_layer("Clean.Architecture.Core", Role::Other), Layer::Domain);
        assert_eq!(classify_layer("Clean.Architecture.UseCases", Role::Other), Layer::Application);
        assert_eq!(classify_layer("Clean.Architecture.Infrastructure", Role::Other), Layer::Infrastructure);
        assert_eq!(classify_layer("Clean.Architecture.UnitTests", Role::Other), Layer::Test);
        assert_eq!(classify_layer("", Role::Handler), Layer::Application);
        assert_eq!(classify_layer("", Role::Other), Layer::Unknown);
    }
}
