use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A named GET endpoint of the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub name: String,
    /// Path template, e.g. `/chats/channel/{chatId}/messages`.
    pub path: String,
    pub description: String,
    pub category: String,
    /// Top-level key holding the item list, when the endpoint uses one.
    pub plural_key: Option<String>,
    /// Sibling path tried once if `path` answers 404.
    pub fallback: Option<String>,
}

impl EndpointSpec {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let category = path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name: name.into(),
            path,
            description: description.into(),
            category,
            plural_key: None,
            fallback: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_plural_key(mut self, key: impl Into<String>) -> Self {
        self.plural_key = Some(key.into());
        self
    }

    pub fn with_fallback(mut self, path: impl Into<String>) -> Self {
        self.fallback = Some(path.into());
        self
    }

    /// Placeholder names in the path template, in order.
    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.path)
    }

    pub fn is_parameterized(&self) -> bool {
        self.path.contains('{')
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidEndpoint {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        for path in std::iter::once(&self.path).chain(self.fallback.as_ref()) {
            if !path.starts_with('/') {
                return Err(invalid("path must start with '/'"));
            }
            if path.matches('{').count() != path.matches('}').count() {
                return Err(invalid("unbalanced placeholder braces"));
            }
        }
        Ok(())
    }
}

/// Extract `{name}` placeholders from a path template.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// Endpoint catalog, built once at startup and passed to whatever resolves names.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    endpoints: Vec<EndpointSpec>,
    by_name: BTreeMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog of known endpoints.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in builtin_endpoints() {
            let registered = registry.register(spec);
            debug_assert!(registered.is_ok(), "invalid builtin endpoint: {registered:?}");
        }
        registry
    }

    pub fn register(&mut self, spec: EndpointSpec) -> Result<()> {
        spec.validate()?;
        if self.by_name.contains_key(&spec.name) {
            return Err(Error::DuplicateEndpoint(spec.name));
        }
        self.by_name.insert(spec.name.clone(), self.endpoints.len());
        self.endpoints.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&EndpointSpec> {
        self.by_name
            .get(name)
            .map(|&i| &self.endpoints[i])
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Endpoints in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Split into endpoints callable without parameters and those needing some.
    pub fn partition(&self) -> (Vec<&EndpointSpec>, Vec<&EndpointSpec>) {
        self.endpoints.iter().partition(|e| !e.is_parameterized())
    }

    pub fn categories(&self) -> BTreeMap<&str, Vec<&EndpointSpec>> {
        let mut grouped: BTreeMap<&str, Vec<&EndpointSpec>> = BTreeMap::new();
        for spec in &self.endpoints {
            grouped.entry(spec.category.as_str()).or_default().push(spec);
        }
        grouped
    }
}

pub const CHAT_MESSAGES: &str = "chat-messages";
pub const CHANNEL_USERS: &str = "channel-users";
pub const ORGANIZATION_MEMBERS: &str = "organization-members";
pub const ENDLESS_ACTIVITIES: &str = "endless-activities";

fn builtin_endpoints() -> Vec<EndpointSpec> {
    vec![
        // chats
        EndpointSpec::new("chats-teams", "/chats/teams", "Chat teams"),
        EndpointSpec::new(
            ORGANIZATION_MEMBERS,
            "/chats/organization/members",
            "Organization members with chat profiles",
        )
        .with_plural_key("members"),
        EndpointSpec::new(
            CHAT_MESSAGES,
            "/chats/channel/{chatId}/messages",
            "Message history of a chat",
        )
        .with_plural_key("messages")
        .with_fallback("/chats/channels/{chatId}/messages"),
        EndpointSpec::new(
            CHANNEL_USERS,
            "/chats/channels/{chatId}/users",
            "Users of a chat channel",
        )
        .with_plural_key("users"),
        EndpointSpec::new("user-channels", "/chats/channels/{userId}", "Channels visible to a user")
            .with_plural_key("channels"),
        // courses
        EndpointSpec::new("organization-courses", "/organization/courses", "Courses")
            .with_category("courses"),
        EndpointSpec::new("courses-groups", "/organization/courses/groups", "Course groups")
            .with_category("courses"),
        EndpointSpec::new("course-details", "/courses/{courseId}", "One course"),
        EndpointSpec::new(
            "course-group-info",
            "/courses/{courseId}/groups/{groupId}",
            "One course group",
        ),
        EndpointSpec::new(
            "course-group-statistics",
            "/courses/{courseId}/groups/{groupId}/statistics",
            "Statistics of a course group",
        ),
        EndpointSpec::new(
            "user-course-statistics",
            "/organization/users/{userId}/statistics",
            "Course statistics of a user",
        )
        .with_category("courses"),
        // events
        EndpointSpec::new(
            "organization-events-schedule",
            "/organization/events/schedule",
            "Scheduled events of the organization",
        )
        .with_category("eventsessions"),
        EndpointSpec::new(
            "user-events-schedule",
            "/users/{userId}/events/schedule",
            "Scheduled events of a user",
        )
        .with_category("eventsessions"),
        EndpointSpec::new("endless-events", "/eventsessions/endless", "Endless event rooms")
            .with_plural_key("eventSessions"),
        EndpointSpec::new(
            ENDLESS_ACTIVITIES,
            "/eventsessions/endless/activities",
            "Call activities in endless rooms",
        )
        .with_plural_key("activities"),
        EndpointSpec::new(
            "event-session",
            "/eventsessions/{eventSessionId}",
            "One event session",
        ),
        EndpointSpec::new(
            "event-participations",
            "/eventsessions/{eventSessionId}/participations",
            "Participants of an event session",
        )
        .with_plural_key("participations"),
        EndpointSpec::new(
            "event-recordings",
            "/eventsessions/{eventSessionId}/recordings",
            "Recordings of an event session",
        )
        .with_plural_key("recordings"),
        EndpointSpec::new(
            "event-transcripts",
            "/eventsessions/{eventSessionId}/transcript/list",
            "Transcripts of an event session",
        )
        .with_plural_key("transcripts"),
        EndpointSpec::new(
            "event-chat",
            "/eventsessions/{eventSessionId}/chat",
            "Chat of an event session",
        ),
        EndpointSpec::new(
            "event-questions",
            "/eventsessions/{eventSessionId}/questions",
            "Questions asked during an event session",
        ),
        EndpointSpec::new(
            "event-attention-checkpoints",
            "/eventsessions/{eventSessionId}/attention-control/checkpoints",
            "Attention control checkpoints",
        ),
        EndpointSpec::new("records", "/records", "Recordings of the organization")
            .with_plural_key("recordings"),
        EndpointSpec::new("transcript", "/transcript/{transcriptId}", "One transcript"),
        // statistics
        EndpointSpec::new("stats-events", "/stats/events", "Event statistics"),
        EndpointSpec::new("stats-users", "/stats/users", "User statistics"),
        EndpointSpec::new(
            "stats-user-visits",
            "/stats/users/visits/{userId}",
            "Visits of a user",
        ),
        // organization
        EndpointSpec::new("organization-members-list", "/organization/members", "Organization members")
            .with_plural_key("members"),
        EndpointSpec::new("organization-groups", "/organization-groups", "Organization groups"),
        EndpointSpec::new("profile", "/profile", "Profile of the token owner"),
        EndpointSpec::new("brandings", "/brandings", "Branding settings"),
        EndpointSpec::new("timezones", "/timezones", "Available timezones"),
        EndpointSpec::new("contacts-search", "/contacts/search", "Address book search"),
        EndpointSpec::new("contact-user", "/contacts/{contactId}/user", "User behind a contact"),
        // files and tests
        EndpointSpec::new("files", "/fileSystem/files", "Files in the organization storage"),
        EndpointSpec::new("tests-list", "/tests/list", "Tests"),
        EndpointSpec::new("test-results", "/tests/{testId}/results", "Results of a test"),
    ]
}
