//! Connected-service records stored in a bot configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const REDACTED: &str = "<redacted>";

/// Kind of external service a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Endpoint,
    BotService,
    LanguageUnderstanding,
    KnowledgeBase,
    Dispatch,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Endpoint => "endpoint",
            ServiceType::BotService => "bot-service",
            ServiceType::LanguageUnderstanding => "language-understanding",
            ServiceType::KnowledgeBase => "knowledge-base",
            ServiceType::Dispatch => "dispatch",
        }
    }

    /// Names of the fields encrypted at rest for this type, in the order
    /// [`ServiceDescriptor::sensitive_values_mut`] yields them.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            ServiceType::Endpoint | ServiceType::BotService => &["appPassword"],
            ServiceType::LanguageUnderstanding | ServiceType::Dispatch => {
                &["authoringKey", "subscriptionKey"]
            }
            ServiceType::KnowledgeBase => &["subscriptionKey"],
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "endpoint" => Ok(ServiceType::Endpoint),
            "bot-service" => Ok(ServiceType::BotService),
            "language-understanding" => Ok(ServiceType::LanguageUnderstanding),
            "knowledge-base" => Ok(ServiceType::KnowledgeBase),
            "dispatch" => Ok(ServiceType::Dispatch),
            other => Err(format!("unknown service type '{other}'")),
        }
    }
}

/// Bot messaging endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_password: String,
    #[serde(default)]
    pub endpoint: String,
}

/// Hosted bot registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub app_password: String,
}

/// Language-understanding application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageUnderstandingService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub authoring_key: String,
    #[serde(default)]
    pub subscription_key: String,
}

/// Question-and-answer knowledge base.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kb_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub subscription_key: String,
}

/// Dispatch model routing across other connected services.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub service_ids: Vec<String>,
    #[serde(default)]
    pub authoring_key: String,
    #[serde(default)]
    pub subscription_key: String,
}

/// One connected service, tagged on disk by its `type` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServiceDescriptor {
    Endpoint(EndpointService),
    BotService(BotService),
    LanguageUnderstanding(LanguageUnderstandingService),
    KnowledgeBase(KnowledgeBaseService),
    Dispatch(DispatchService),
}

impl ServiceDescriptor {
    pub fn service_type(&self) -> ServiceType {
        match self {
            ServiceDescriptor::Endpoint(_) => ServiceType::Endpoint,
            ServiceDescriptor::BotService(_) => ServiceType::BotService,
            ServiceDescriptor::LanguageUnderstanding(_) => ServiceType::LanguageUnderstanding,
            ServiceDescriptor::KnowledgeBase(_) => ServiceType::KnowledgeBase,
            ServiceDescriptor::Dispatch(_) => ServiceType::Dispatch,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ServiceDescriptor::Endpoint(s) => &s.id,
            ServiceDescriptor::BotService(s) => &s.id,
            ServiceDescriptor::LanguageUnderstanding(s) => &s.id,
            ServiceDescriptor::KnowledgeBase(s) => &s.id,
            ServiceDescriptor::Dispatch(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceDescriptor::Endpoint(s) => &s.name,
            ServiceDescriptor::BotService(s) => &s.name,
            ServiceDescriptor::LanguageUnderstanding(s) => &s.name,
            ServiceDescriptor::KnowledgeBase(s) => &s.name,
            ServiceDescriptor::Dispatch(s) => &s.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            ServiceDescriptor::Endpoint(s) => s.name = name,
            ServiceDescriptor::BotService(s) => s.name = name,
            ServiceDescriptor::LanguageUnderstanding(s) => s.name = name,
            ServiceDescriptor::KnowledgeBase(s) => s.name = name,
            ServiceDescriptor::Dispatch(s) => s.name = name,
        }
    }

    /// Mutable handles to the fields named by [`ServiceType::sensitive_fields`].
    pub fn sensitive_values_mut(&mut self) -> Vec<&mut String> {
        match self {
            ServiceDescriptor::Endpoint(s) => vec![&mut s.app_password],
            ServiceDescriptor::BotService(s) => vec![&mut s.app_password],
            ServiceDescriptor::LanguageUnderstanding(s) => {
                vec![&mut s.authoring_key, &mut s.subscription_key]
            }
            ServiceDescriptor::KnowledgeBase(s) => vec![&mut s.subscription_key],
            ServiceDescriptor::Dispatch(s) => vec![&mut s.authoring_key, &mut s.subscription_key],
        }
    }

    /// Copy suitable for display: every non-empty sensitive value is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in copy.sensitive_values_mut() {
            if !value.is_empty() {
                *value = REDACTED.to_string();
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DispatchService, KnowledgeBaseService, LanguageUnderstandingService, ServiceDescriptor,
        ServiceType,
    };
    use serde_json::json;

    #[test]
    fn reads_tagged_records() {
        let raw = json!({
            "type": "knowledge-base",
            "id": "kb-1",
            "name": "faq",
            "kbId": "1234",
            "hostname": "https://faq.example.net/qnamaker",
            "subscriptionKey": "sub-key"
        });
        let service: ServiceDescriptor = serde_json::from_value(raw).expect("valid record");
        assert_eq!(service.service_type(), ServiceType::KnowledgeBase);
        assert_eq!(service.id(), "kb-1");
        assert_eq!(service.name(), "faq");
        match service {
            ServiceDescriptor::KnowledgeBase(kb) => assert_eq!(kb.subscription_key, "sub-key"),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn writes_type_tag_and_camel_case_fields() {
        let service = ServiceDescriptor::LanguageUnderstanding(LanguageUnderstandingService {
            id: "luis-1".to_string(),
            name: "intents".to_string(),
            authoring_key: "author".to_string(),
            ..Default::default()
        });
        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["type"], "language-understanding");
        assert_eq!(value["authoringKey"], "author");
        assert_eq!(value["subscriptionKey"], "");
    }

    #[test]
    fn sensitive_fields_follow_type() {
        let mut dispatch = ServiceDescriptor::Dispatch(DispatchService {
            authoring_key: "a".to_string(),
            subscription_key: "s".to_string(),
            ..Default::default()
        });
        let fields = dispatch.service_type().sensitive_fields();
        assert_eq!(fields, &["authoringKey", "subscriptionKey"]);
        assert_eq!(dispatch.sensitive_values_mut().len(), fields.len());
        assert_eq!(ServiceType::Endpoint.sensitive_fields(), &["appPassword"]);
        assert_eq!(ServiceType::KnowledgeBase.sensitive_fields(), &["subscriptionKey"]);
    }

    #[test]
    fn redaction_masks_only_present_secrets() {
        let service = ServiceDescriptor::Dispatch(DispatchService {
            id: "d".to_string(),
            authoring_key: "a".to_string(),
            ..Default::default()
        });
        match service.redacted() {
            ServiceDescriptor::Dispatch(d) => {
                assert_eq!(d.authoring_key, "<redacted>");
                assert_eq!(d.subscription_key, "");
                assert_eq!(d.id, "d");
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn parses_type_names() {
        assert_eq!("bot-service".parse::<ServiceType>(), Ok(ServiceType::BotService));
        assert!("qna".parse::<ServiceType>().is_err());
        let kb = ServiceDescriptor::KnowledgeBase(KnowledgeBaseService::default());
        assert_eq!(kb.service_type().to_string(), "knowledge-base");
    }
}
