use serde::{Deserialize, Serialize};

/// A unit of per-entity processing (a discovered business).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Stable identifier (e.g. a directory place id).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the entity already has the artifact the pipeline would produce.
    /// Such entities are dropped by the filtering stage.
    #[serde(default)]
    pub has_target_artifact: bool,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default)]
    pub review_count: u32,
    /// Collaborator-specific data the engine never inspects.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn in_market(mut self, industry: &str, city: &str, state: Option<&str>) -> Self {
        self.industry = industry.to_string();
        self.city = city.to_string();
        self.state = state.map(|s| s.to_string());
        self
    }

    pub fn with_target_artifact(mut self, url: &str) -> Self {
        self.has_target_artifact = true;
        self.website_url = Some(url.to_string());
        self
    }

    pub fn with_rating(mut self, rating: f32, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = review_count;
        self
    }

    /// True when both entities are in the same industry and city, and the
    /// same state whenever both sides know theirs.
    pub fn same_market(&self, industry: &str, city: &str, state: Option<&str>) -> bool {
        if !self.industry.eq_ignore_ascii_case(industry) {
            return false;
        }
        if !self.city.eq_ignore_ascii_case(city) {
            return false;
        }
        match (self.state.as_deref(), state) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_market_is_case_insensitive() {
        let entity = Entity::new("e1", "ABC Roofing").in_market("Roofing", "austin", Some("tx"));
        assert!(entity.same_market("roofing", "Austin", Some("TX")));
        assert!(!entity.same_market("plumbing", "Austin", Some("TX")));
        assert!(!entity.same_market("roofing", "Dallas", Some("TX")));
        assert!(!entity.same_market("roofing", "Austin", Some("CA")));
    }

    #[test]
    fn test_same_market_ignores_unknown_state() {
        let entity = Entity::new("e1", "ABC Roofing").in_market("roofing", "Austin", None);
        assert!(entity.same_market("roofing", "Austin", Some("TX")));
    }

    #[test]
    fn test_deserialize_minimal_entity() {
        let entity: Entity = serde_json::from_str(r#"{"id":"p1","name":"Shop"}"#).unwrap();
        assert_eq!(entity.id, "p1");
        assert!(!entity.has_target_artifact);
        assert!(entity.attributes.is_empty());
    }
}
