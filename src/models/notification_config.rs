//! XML documents of `PUT/GET /{bucket}?notification`.
//!
//! A configuration lists destinations per flavour; each destination names
//! one or more events and an optional key filter. Stored rules are the
//! flattened form: one row per (destination, event).

use super::notification::{Destination, DestinationKind, NewNotificationRule, NotificationRule};
use serde::{Deserialize, Serialize};

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename = "NotificationConfiguration")]
pub struct NotificationConfiguration {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "QueueConfiguration", default)]
    pub queue_configurations: Vec<QueueConfiguration>,

    #[serde(rename = "TopicConfiguration", default)]
    pub topic_configurations: Vec<TopicConfiguration>,

    #[serde(rename = "CloudFunctionConfiguration", default)]
    pub function_configurations: Vec<FunctionConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct QueueConfiguration {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Queue")]
    pub queue: String,
    #[serde(rename = "Event", default)]
    pub events: Vec<String>,
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<NotificationFilter>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct TopicConfiguration {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Topic")]
    pub topic: String,
    #[serde(rename = "Event", default)]
    pub events: Vec<String>,
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<NotificationFilter>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct FunctionConfiguration {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "CloudFunction")]
    pub cloud_function: String,
    #[serde(rename = "Event", default)]
    pub events: Vec<String>,
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<NotificationFilter>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct NotificationFilter {
    #[serde(rename = "S3Key", default)]
    pub s3_key: S3KeyFilter,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct S3KeyFilter {
    #[serde(rename = "FilterRule", default)]
    pub filter_rules: Vec<FilterRule>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct FilterRule {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl NotificationFilter {
    fn from_parts(prefix: Option<&str>, suffix: Option<&str>) -> Option<Self> {
        let mut filter_rules = Vec::new();
        if let Some(value) = prefix {
            filter_rules.push(FilterRule {
                name: "prefix".into(),
                value: value.to_string(),
            });
        }
        if let Some(value) = suffix {
            filter_rules.push(FilterRule {
                name: "suffix".into(),
                value: value.to_string(),
            });
        }
        if filter_rules.is_empty() {
            None
        } else {
            Some(Self {
                s3_key: S3KeyFilter { filter_rules },
            })
        }
    }

    /// Returns `(prefix, suffix)`; a later rule of the same name wins.
    fn split(&self) -> (Option<String>, Option<String>) {
        let mut prefix = None;
        let mut suffix = None;
        for rule in &self.s3_key.filter_rules {
            if rule.name.eq_ignore_ascii_case("prefix") {
                prefix = Some(rule.value.clone());
            } else if rule.name.eq_ignore_ascii_case("suffix") {
                suffix = Some(rule.value.clone());
            }
        }
        (prefix, suffix)
    }
}

/// A configuration entry that could not be turned into rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidConfiguration(pub String);

/// Flavour-independent view over the three configuration kinds.
struct Entry<'a> {
    kind: DestinationKind,
    address: &'a str,
    events: &'a [String],
    filter: Option<&'a NotificationFilter>,
}

impl NotificationConfiguration {
    fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        let queues = self.queue_configurations.iter().map(|c| Entry {
            kind: DestinationKind::Sqs,
            address: &c.queue,
            events: &c.events,
            filter: c.filter.as_ref(),
        });
        let topics = self.topic_configurations.iter().map(|c| Entry {
            kind: DestinationKind::Sns,
            address: &c.topic,
            events: &c.events,
            filter: c.filter.as_ref(),
        });
        let functions = self.function_configurations.iter().map(|c| Entry {
            kind: DestinationKind::Lambda,
            address: &c.cloud_function,
            events: &c.events,
            filter: c.filter.as_ref(),
        });
        queues.chain(topics).chain(functions)
    }

    /// Flatten into one rule per (destination, event).
    pub fn to_rules(&self) -> Result<Vec<NewNotificationRule>, InvalidConfiguration> {
        let mut rules = Vec::new();
        for entry in self.entries() {
            let address = entry.address.trim();
            if address.is_empty() {
                return Err(InvalidConfiguration(format!(
                    "{} destination must not be empty",
                    entry.kind.as_str()
                )));
            }
            let (filter_prefix, filter_suffix) =
                entry.filter.map(NotificationFilter::split).unwrap_or_default();
            for event in entry.events {
                let event = event.trim();
                if event.is_empty() {
                    return Err(InvalidConfiguration("event name must not be empty".into()));
                }
                rules.push(NewNotificationRule {
                    event_type: event.to_string(),
                    destination: Destination::webhook(entry.kind, address),
                    filter_prefix: filter_prefix.clone(),
                    filter_suffix: filter_suffix.clone(),
                });
            }
        }
        Ok(rules)
    }

    /// Regroup stored rules into a configuration document.
    ///
    /// Rules sharing destination and filter collapse into one entry; the
    /// entry id is the id of its first rule. Disabled rules are omitted.
    pub fn from_rules(rules: &[NotificationRule]) -> Self {
        let mut config = Self {
            xmlns: Some(S3_XMLNS.into()),
            ..Self::default()
        };
        let mut groups: Vec<(DestinationKind, &str, Option<&str>, Option<&str>, String, Vec<String>)> =
            Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            let group_key = (
                rule.destination_type,
                rule.destination_address.as_str(),
                rule.filter_prefix.as_deref(),
                rule.filter_suffix.as_deref(),
            );
            match groups
                .iter_mut()
                .find(|g| (g.0, g.1, g.2, g.3) == group_key)
            {
                Some(group) => group.5.push(rule.event_type.clone()),
                None => groups.push((
                    group_key.0,
                    group_key.1,
                    group_key.2,
                    group_key.3,
                    rule.id.to_string(),
                    vec![rule.event_type.clone()],
                )),
            }
        }

        for (kind, address, prefix, suffix, id, events) in groups {
            let filter = NotificationFilter::from_parts(prefix, suffix);
            let id = Some(id);
            match kind {
                DestinationKind::Sqs => config.queue_configurations.push(QueueConfiguration {
                    id,
                    queue: address.to_string(),
                    events,
                    filter,
                }),
                DestinationKind::Sns => config.topic_configurations.push(TopicConfiguration {
                    id,
                    topic: address.to_string(),
                    events,
                    filter,
                }),
                DestinationKind::Lambda => {
                    config.function_configurations.push(FunctionConfiguration {
                        id,
                        cloud_function: address.to_string(),
                        events,
                        filter,
                    })
                }
            }
        }

        config
    }
}
