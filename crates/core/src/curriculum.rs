//! Static Curriculum Graph
//!
//! Topics grouped into roadmaps, loaded once at process start and read-only
//! afterwards. Each topic carries prerequisites, descriptive metadata, and an
//! implicit linear successor given by its position in the roadmap sequence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_required_mastery() -> f64 {
    0.7
}

fn default_min_problems() -> u32 {
    3
}

/// A single teachable unit. Immutable; belongs to exactly one [`Roadmap`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Ordered list of finer-grained concepts covered by this topic.
    #[serde(default)]
    pub subtopics: Vec<String>,
    /// Topic ids that should be mastered before this one.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Mastery level at which the topic counts as learned.
    #[serde(default = "default_required_mastery")]
    pub required_mastery: f64,
    /// Minimum practice problems before advancement is considered.
    #[serde(default = "default_min_problems")]
    pub min_practice_problems: u32,
}

/// An ordered sequence of topics forming one course of study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub topics: Vec<Topic>,
}

impl Roadmap {
    /// Returns the topic immediately following `topic_id` in sequence order,
    /// or `None` if it is the last topic or unknown.
    pub fn next_topic(&self, topic_id: &str) -> Option<&Topic> {
        let idx = self.topics.iter().position(|t| t.id == topic_id)?;
        self.topics.get(idx + 1)
    }

    pub fn first_topic(&self) -> Option<&Topic> {
        self.topics.first()
    }
}

/// All roadmaps known to the process, with a topic-to-roadmap index.
#[derive(Debug, Clone)]
pub struct Curriculum {
    roadmaps: HashMap<String, Roadmap>,
    /// Roadmap ids in load order, so fallback resolution is deterministic.
    order: Vec<String>,
    topic_index: HashMap<String, String>,
}

impl Curriculum {
    pub fn new(roadmaps: Vec<Roadmap>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        let mut topic_index = HashMap::new();
        for roadmap in roadmaps {
            for topic in &roadmap.topics {
                topic_index.insert(topic.id.clone(), roadmap.id.clone());
            }
            order.push(roadmap.id.clone());
            map.insert(roadmap.id.clone(), roadmap);
        }
        Self {
            roadmaps: map,
            order,
            topic_index,
        }
    }

    /// Deserializes a curriculum from a JSON array of roadmaps.
    pub fn from_json(json: &str) -> Result<Self> {
        let roadmaps: Vec<Roadmap> =
            serde_json::from_str(json).context("Failed to parse curriculum JSON")?;
        Ok(Self::new(roadmaps))
    }

    pub fn roadmap(&self, roadmap_id: &str) -> Option<&Roadmap> {
        self.roadmaps.get(roadmap_id)
    }

    /// The roadmap a topic belongs to.
    pub fn roadmap_for(&self, topic_id: &str) -> Option<&Roadmap> {
        let roadmap_id = self.topic_index.get(topic_id)?;
        self.roadmaps.get(roadmap_id)
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.roadmap_for(topic_id)?
            .topics
            .iter()
            .find(|t| t.id == topic_id)
    }

    /// The linear successor of a topic within its own roadmap.
    pub fn next_topic(&self, topic_id: &str) -> Option<&Topic> {
        self.roadmap_for(topic_id)?.next_topic(topic_id)
    }

    /// Resolves a requested topic id, falling back to the first topic of the
    /// first loaded roadmap when the id is unknown. `None` only if the
    /// curriculum holds no topics at all.
    pub fn resolve_or_first(&self, topic_id: &str) -> Option<&Topic> {
        if let Some(topic) = self.topic(topic_id) {
            return Some(topic);
        }
        self.order
            .iter()
            .find_map(|id| self.roadmaps.get(id)?.first_topic())
    }

    pub fn is_empty(&self) -> bool {
        self.topic_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Curriculum {
        let json = r#"[
            {
                "id": "arithmetic",
                "title": "Arithmetic",
                "description": "Foundations of number work",
                "topics": [
                    {"id": "addition", "title": "Addition", "subtopics": ["carrying"]},
                    {"id": "subtraction", "title": "Subtraction", "prerequisites": ["addition"]},
                    {"id": "multiplication", "title": "Multiplication", "prerequisites": ["addition"]}
                ]
            },
            {
                "id": "geometry",
                "title": "Geometry",
                "topics": [
                    {"id": "shapes", "title": "Shapes"}
                ]
            }
        ]"#;
        Curriculum::from_json(json).unwrap()
    }

    #[test]
    fn next_topic_follows_sequence_order() {
        let curriculum = sample();
        assert_eq!(curriculum.next_topic("addition").unwrap().id, "subtraction");
        assert_eq!(
            curriculum.next_topic("subtraction").unwrap().id,
            "multiplication"
        );
    }

    #[test]
    fn next_topic_is_none_for_last_or_unknown() {
        let curriculum = sample();
        assert!(curriculum.next_topic("multiplication").is_none());
        assert!(curriculum.next_topic("no-such-topic").is_none());
        // Last topic of a different roadmap, no cross-roadmap successor.
        assert!(curriculum.next_topic("shapes").is_none());
    }

    #[test]
    fn topic_lookup_spans_roadmaps() {
        let curriculum = sample();
        assert_eq!(curriculum.topic("shapes").unwrap().title, "Shapes");
        assert_eq!(curriculum.roadmap_for("shapes").unwrap().id, "geometry");
    }

    #[test]
    fn unknown_topic_falls_back_to_first_of_first_roadmap() {
        let curriculum = sample();
        assert_eq!(curriculum.resolve_or_first("bogus").unwrap().id, "addition");
        assert_eq!(curriculum.resolve_or_first("shapes").unwrap().id, "shapes");
    }

    #[test]
    fn defaults_apply_to_sparse_topic_definitions() {
        let curriculum = sample();
        let topic = curriculum.topic("shapes").unwrap();
        assert_eq!(topic.required_mastery, 0.7);
        assert_eq!(topic.min_practice_problems, 3);
        assert!(topic.prerequisites.is_empty());
    }

    #[test]
    fn empty_curriculum_resolves_nothing() {
        let curriculum = Curriculum::new(vec![]);
        assert!(curriculum.is_empty());
        assert!(curriculum.resolve_or_first("anything").is_none());
    }
}
