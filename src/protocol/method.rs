//! Type-safe definitions for the protocol method identifiers.
//! The set is closed: anything not listed here is rejected as `MethodNotFound`.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use std::fmt::{ self, Display };

/// Represents the methods spoken by the lite protocol dialect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Method {
    /// Core initialization
    #[serde(rename = "initialize")]
    Initialize,

    /// Simple ping to check connection
    #[serde(rename = "ping")]
    Ping,

    /// List available tools
    #[serde(rename = "tools/list")]
    ToolsList,

    /// Call a tool
    #[serde(rename = "tools/call")]
    ToolsCall,

    /// List available resources
    #[serde(rename = "resources/list")]
    ResourcesList,

    /// Read a specific resource
    #[serde(rename = "resources/read")]
    ResourcesRead,

    /// List resource templates
    #[serde(rename = "resources/templates/list")]
    ResourcesTemplatesList,

    /// Subscribe to resource updates
    #[serde(rename = "resources/subscribe")]
    ResourcesSubscribe,

    /// Unsubscribe from resource updates
    #[serde(rename = "resources/unsubscribe")]
    ResourcesUnsubscribe,

    /// List available prompts
    #[serde(rename = "prompts/list")]
    PromptsList,

    /// Get a specific prompt
    #[serde(rename = "prompts/get")]
    PromptsGet,

    /// Set logging level
    #[serde(rename = "logging/setLevel")]
    LoggingSetLevel,

    /// List roots (directories/files)
    #[serde(rename = "roots/list")]
    RootsList,

    /// Create a message from LLM
    #[serde(rename = "sampling/createMessage")]
    SamplingCreateMessage,

    /// Get completion options
    #[serde(rename = "completion/complete")]
    CompletionComplete,

    /// Notification that initialization is complete
    #[serde(rename = "notifications/initialized")]
    NotificationsInitialized,

    /// Progress update notification
    #[serde(rename = "notifications/progress")]
    NotificationsProgress,

    /// Log message notification
    #[serde(rename = "notifications/message")]
    NotificationsMessage,

    /// Notification of resource updates
    #[serde(rename = "notifications/resources/updated")]
    NotificationsResourcesUpdated,

    /// Request cancellation notification
    #[serde(rename = "notifications/cancelled")]
    NotificationsCancelled,

    /// Notification of tool list changes
    #[serde(rename = "notifications/tools/list_changed")]
    NotificationsToolsListChanged,

    /// Notification of resource list changes
    #[serde(rename = "notifications/resources/list_changed")]
    NotificationsResourcesListChanged,

    /// Notification of prompt list changes
    #[serde(rename = "notifications/prompts/list_changed")]
    NotificationsPromptsListChanged,
}

const REQUEST_METHODS: [Method; 15] = [
    Method::Initialize,
    Method::Ping,
    Method::ToolsList,
    Method::ToolsCall,
    Method::ResourcesList,
    Method::ResourcesRead,
    Method::ResourcesTemplatesList,
    Method::ResourcesSubscribe,
    Method::ResourcesUnsubscribe,
    Method::PromptsList,
    Method::PromptsGet,
    Method::LoggingSetLevel,
    Method::RootsList,
    Method::SamplingCreateMessage,
    Method::CompletionComplete,
];

impl Method {
    /// Every method that expects a reply
    pub fn requests() -> &'static [Method] {
        &REQUEST_METHODS
    }

    /// Get the string representation of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Ping => "ping",
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead => "resources/read",
            Method::ResourcesTemplatesList => "resources/templates/list",
            Method::ResourcesSubscribe => "resources/subscribe",
            Method::ResourcesUnsubscribe => "resources/unsubscribe",
            Method::PromptsList => "prompts/list",
            Method::PromptsGet => "prompts/get",
            Method::LoggingSetLevel => "logging/setLevel",
            Method::RootsList => "roots/list",
            Method::SamplingCreateMessage => "sampling/createMessage",
            Method::CompletionComplete => "completion/complete",
            Method::NotificationsInitialized => "notifications/initialized",
            Method::NotificationsProgress => "notifications/progress",
            Method::NotificationsMessage => "notifications/message",
            Method::NotificationsResourcesUpdated => "notifications/resources/updated",
            Method::NotificationsCancelled => "notifications/cancelled",
            Method::NotificationsToolsListChanged => "notifications/tools/list_changed",
            Method::NotificationsResourcesListChanged => "notifications/resources/list_changed",
            Method::NotificationsPromptsListChanged => "notifications/prompts/list_changed",
        }
    }

    /// Check if this method is a notification
    pub fn is_notification(&self) -> bool {
        !REQUEST_METHODS.contains(self)
    }

    /// Check if this method is a request that requires a response
    pub fn is_request(&self) -> bool {
        !self.is_notification()
    }

    /// Reserved methods are accepted but have no behaviour behind them
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Method::Ping |
                Method::LoggingSetLevel |
                Method::RootsList |
                Method::SamplingCreateMessage |
                Method::CompletionComplete |
                Method::ResourcesSubscribe |
                Method::ResourcesUnsubscribe
        )
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempts to parse a string into a Method
impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialize" => Ok(Method::Initialize),
            "ping" => Ok(Method::Ping),
            "tools/list" => Ok(Method::ToolsList),
            "tools/call" => Ok(Method::ToolsCall),
            "resources/list" => Ok(Method::ResourcesList),
            "resources/read" => Ok(Method::ResourcesRead),
            "resources/templates/list" => Ok(Method::ResourcesTemplatesList),
            "resources/subscribe" => Ok(Method::ResourcesSubscribe),
            "resources/unsubscribe" => Ok(Method::ResourcesUnsubscribe),
            "prompts/list" => Ok(Method::PromptsList),
            "prompts/get" => Ok(Method::PromptsGet),
            "logging/setLevel" => Ok(Method::LoggingSetLevel),
            "roots/list" => Ok(Method::RootsList),
            "sampling/createMessage" => Ok(Method::SamplingCreateMessage),
            "completion/complete" => Ok(Method::CompletionComplete),
            "notifications/initialized" => Ok(Method::NotificationsInitialized),
            "notifications/progress" => Ok(Method::NotificationsProgress),
            "notifications/message" => Ok(Method::NotificationsMessage),
            "notifications/resources/updated" => Ok(Method::NotificationsResourcesUpdated),
            "notifications/cancelled" => Ok(Method::NotificationsCancelled),
            "notifications/tools/list_changed" => Ok(Method::NotificationsToolsListChanged),
            "notifications/resources/list_changed" => Ok(Method::NotificationsResourcesListChanged),
            "notifications/prompts/list_changed" => Ok(Method::NotificationsPromptsListChanged),
            _ => Err(format!("Unknown method: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serialization() {
        let serialized = serde_json::to_string(&Method::ResourcesTemplatesList).unwrap();
        assert_eq!(serialized, "\"resources/templates/list\"");

        let deserialized: Method = serde_json::from_str("\"tools/call\"").unwrap();
        assert_eq!(deserialized, Method::ToolsCall);
    }

    #[test]
    fn test_as_str_and_from_str_agree() {
        for method in Method::requests() {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), *method);
            assert_eq!(serde_json::to_value(method).unwrap(), method.as_str());
        }
        assert!("tools/destroy".parse::<Method>().is_err());
    }

    #[test]
    fn test_is_notification() {
        assert!(Method::NotificationsInitialized.is_notification());
        assert!(Method::NotificationsCancelled.is_notification());
        assert!(!Method::Initialize.is_notification());
        assert!(Method::requests().iter().all(Method::is_request));
    }

    #[test]
    fn test_reserved_methods() {
        assert!(Method::Ping.is_reserved());
        assert!(Method::ResourcesUnsubscribe.is_reserved());
        assert!(!Method::ToolsCall.is_reserved());
        assert_eq!(Method::requests().iter().filter(|m| m.is_reserved()).count(), 7);
    }
}
