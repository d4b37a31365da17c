// src/catalog.rs

use crate::error::EngineResult;
use crate::models::{Bucket, QuestionItem, TopicId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Case-insensitive match: equal, or either name contains the other.
pub fn topics_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

pub(crate) fn normalize(topic: &str) -> String {
    topic.trim().to_lowercase()
}

/// A theme every exam must touch at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeTag {
    pub name: String,
    /// Extra keywords folded into this theme (e.g. sign-type sub-themes).
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ThemeTag {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        ThemeTag {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        topics_match(&self.name, topic) || self.aliases.iter().any(|a| topics_match(a, topic))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCatalog {
    pub topics: Vec<TopicId>,
    pub beginner_sequence: Vec<TopicId>,
    pub mandatory_themes: Vec<ThemeTag>,
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::driving_theory()
    }
}

impl TopicCatalog {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Built-in catalog for the driving-theory exam.
    pub fn driving_theory() -> Self {
        let topics = [
            "Road Signs",
            "Warning Signs",
            "Regulatory Signs",
            "Right of Way",
            "Roundabout Rules",
            "Speed Limits",
            "Parking",
            "Overtaking",
            "Hazard Awareness",
            "Alcohol and Drugs",
            "Vehicle Safety",
            "Motorway Driving",
            "Pedestrians and Cyclists",
        ];
        TopicCatalog {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            beginner_sequence: vec![
                "Road Signs".to_string(),
                "Right of Way".to_string(),
                "Speed Limits".to_string(),
            ],
            mandatory_themes: vec![
                ThemeTag::new("Road Signs", &["signs"]),
                ThemeTag::new("Right of Way", &["give way", "priority"]),
                ThemeTag::new("Roundabout Rules", &["roundabout"]),
                ThemeTag::new("Speed Limits", &["speed"]),
                ThemeTag::new("Parking", &[]),
                ThemeTag::new("Hazard Awareness", &["hazard"]),
                ThemeTag::new("Alcohol and Drugs", &["alcohol", "drugs"]),
            ],
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        let key = normalize(topic);
        self.topics.iter().any(|t| normalize(t) == key)
    }

    pub fn is_beginner_topic(&self, topic: &str) -> Option<usize> {
        let key = normalize(topic);
        self.beginner_sequence
            .iter()
            .position(|t| normalize(t) == key)
    }
}

/// Read-only question bank with theme and topic membership computed once.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    items: Vec<QuestionItem>,
    index: HashMap<String, usize>,
    /// Per item: indices into `catalog.mandatory_themes`.
    themes: Vec<Vec<usize>>,
    /// Per item: normalized catalog topics the item counts towards.
    links: Vec<HashSet<String>>,
    catalog: TopicCatalog,
}

impl QuestionBank {
    pub fn new(items: Vec<QuestionItem>, catalog: TopicCatalog) -> Self {
        let mut unique = Vec::with_capacity(items.len());
        let mut index = HashMap::new();
        for item in items {
            if index.contains_key(&item.id) {
                warn!("[Bank] Duplicate question id '{}' ignored", item.id);
                continue;
            }
            index.insert(item.id.clone(), unique.len());
            unique.push(item);
        }

        let themes = unique
            .iter()
            .map(|item| {
                catalog
                    .mandatory_themes
                    .iter()
                    .enumerate()
                    .filter(|(_, theme)| theme.matches(&item.topic_id))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();

        let links = unique
            .iter()
            .map(|item| {
                let mut linked: HashSet<String> = catalog
                    .topics
                    .iter()
                    .filter(|topic| topics_match(topic, &item.topic_id))
                    .map(|topic| normalize(topic))
                    .collect();
                linked.insert(normalize(&item.topic_id));
                linked
            })
            .collect();

        debug!(
            "[Bank] Loaded {} questions, {} mandatory themes",
            unique.len(),
            catalog.mandatory_themes.len()
        );

        QuestionBank {
            items: unique,
            index,
            themes,
            links,
            catalog,
        }
    }

    pub fn items(&self) -> &[QuestionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    pub fn get(&self, id: &str) -> Option<&QuestionItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn count(&self, bucket: Bucket) -> usize {
        self.items.iter().filter(|q| q.bucket() == bucket).count()
    }

    /// Indices of the mandatory themes this question covers.
    pub fn themes_of(&self, item: &QuestionItem) -> &[usize] {
        match self.index.get(&item.id) {
            Some(&i) => &self.themes[i],
            None => &[],
        }
    }

    pub fn covers_theme(&self, item: &QuestionItem, theme: usize) -> bool {
        self.themes_of(item).contains(&theme)
    }

    /// Whether a question counts towards `topic`.
    ///
    /// Catalog topics use the precomputed links; anything else falls back
    /// to the same fuzzy rule evaluated on demand.
    pub fn is_linked(&self, item: &QuestionItem, topic: &str) -> bool {
        match self.index.get(&item.id) {
            Some(&i) if self.catalog.contains(topic) => self.links[i].contains(&normalize(topic)),
            _ => topics_match(&item.topic_id, topic),
        }
    }

    pub fn theme_name(&self, theme: usize) -> &str {
        &self.catalog.mandatory_themes[theme].name
    }

    pub fn theme_count(&self) -> usize {
        self.catalog.mandatory_themes.len()
    }
}
