//! §4.4 tag injector: host-level tags, path tags, and a configurable
//! topic derivation rule. The last of the pipeline's core processors,
//! it never discards an event — it only enriches `tags`.

use regex::Regex;

use super::{EventGroup, Processor, ProcessorMetrics};
use crate::identity::FileIdentity;

#[derive(Clone)]
pub enum TopicRule {
    Literal(String),
    GlobalTopic,
    GroupTopic,
    /// Captures group 1 of `regex` against the resolved path.
    RegexCapture(Regex),
}

pub struct TagInjectorConfig {
    pub hostname: String,
    pub host_ip: String,
    pub global_topic: Option<String>,
    pub group_topic: Option<String>,
    pub topic_rule: TopicRule,
}

pub struct TagInjector {
    config: TagInjectorConfig,
    metrics: ProcessorMetrics,
}

impl TagInjector {
    pub fn new(config: TagInjectorConfig) -> Self {
        Self {
            config,
            metrics: ProcessorMetrics::default(),
        }
    }

    fn derive_topic(&self, resolved_path: &str) -> String {
        match &self.config.topic_rule {
            TopicRule::Literal(value) => value.clone(),
            TopicRule::GlobalTopic => self.config.global_topic.clone().unwrap_or_default(),
            TopicRule::GroupTopic => self.config.group_topic.clone().unwrap_or_default(),
            TopicRule::RegexCapture(re) => re
                .captures(resolved_path)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    fn tag_one(&self, identity: &FileIdentity, original_path: &str, resolved_path: &str) -> Vec<(String, String)> {
        vec![
            ("host.name".to_string(), self.config.hostname.clone()),
            ("host.ip".to_string(), self.config.host_ip.clone()),
            ("file.path.original".to_string(), original_path.to_string()),
            ("file.path.resolved".to_string(), resolved_path.to_string()),
            ("file.inode".to_string(), identity.inode.to_string()),
            ("topic".to_string(), self.derive_topic(resolved_path)),
        ]
    }
}

impl Processor for TagInjector {
    fn name(&self) -> &str {
        "tag_injector"
    }

    fn metrics(&self) -> &ProcessorMetrics {
        &self.metrics
    }

    fn process(&self, mut group: EventGroup) -> EventGroup {
        // Path tags are identical for every event in a group (they all
        // came from the same Reader), so the caller is expected to have
        // stashed original/resolved paths on the group's identity; this
        // processor only knows the identity's composite key, so callers
        // needing distinct original/resolved paths pass them explicitly
        // via `tag_with_paths` instead of relying on `process`'s default.
        let identity = group.identity.clone();
        let path_guess = identity.composite_key_suffix();
        let tags = self.tag_one(&identity, &path_guess, &path_guess);
        for event in &mut group.events {
            for (key, value) in &tags {
                event.tags.insert(key.clone(), value.clone());
            }
        }
        group
    }
}

impl TagInjector {
    /// Preferred entry point when the caller has the real original and
    /// resolved paths on hand (the engine wiring always does); `process`
    /// exists to satisfy the [`Processor`] trait for pipelines configured
    /// generically.
    pub fn tag_with_paths(&self, mut group: EventGroup, original_path: &str, resolved_path: &str) -> EventGroup {
        let identity = group.identity.clone();
        let tags = self.tag_one(&identity, original_path, resolved_path);
        for event in &mut group.events {
            for (key, value) in &tags {
                event.tags.insert(key.clone(), value.clone());
            }
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::Event;
    use chrono::Utc;

    fn group() -> EventGroup {
        EventGroup {
            identity: FileIdentity::new(1, 2, "cfg"),
            events: vec![Event {
                timestamp: Utc::now(),
                fields: Default::default(),
                tags: Default::default(),
                discarded: false,
            }],
        }
    }

    fn injector(rule: TopicRule) -> TagInjector {
        TagInjector::new(TagInjectorConfig {
            hostname: "host-a".into(),
            host_ip: "10.0.0.1".into(),
            global_topic: Some("global".into()),
            group_topic: Some("group".into()),
            topic_rule: rule,
        })
    }

    #[test]
    fn injects_host_and_path_tags() {
        let inj = injector(TopicRule::Literal("t".into()));
        let out = inj.tag_with_paths(group(), "/var/log/app.log", "/var/log/app.log");
        assert_eq!(out.events[0].tags.get("host.name").unwrap(), "host-a");
        assert_eq!(out.events[0].tags.get("file.inode").unwrap(), "2");
    }

    #[test]
    fn literal_topic_rule_is_used_verbatim() {
        let inj = injector(TopicRule::Literal("fixed-topic".into()));
        let out = inj.tag_with_paths(group(), "/a", "/a");
        assert_eq!(out.events[0].tags.get("topic").unwrap(), "fixed-topic");
    }

    #[test]
    fn global_topic_rule_uses_the_configured_global_value() {
        let inj = injector(TopicRule::GlobalTopic);
        let out = inj.tag_with_paths(group(), "/a", "/a");
        assert_eq!(out.events[0].tags.get("topic").unwrap(), "global");
    }

    #[test]
    fn regex_capture_rule_extracts_from_resolved_path() {
        let inj = injector(TopicRule::RegexCapture(Regex::new(r"/var/log/(\w+)\.log").unwrap()));
        let out = inj.tag_with_paths(group(), "/var/log/app.log", "/var/log/app.log");
        assert_eq!(out.events[0].tags.get("topic").unwrap(), "app");
    }
}
