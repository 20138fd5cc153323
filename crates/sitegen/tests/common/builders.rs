//! Builders for test entities and requests.

#![allow(dead_code)]

use sitegen::{Entity, JobRequest};

pub const INDUSTRY: &str = "roofing";
pub const CITY: &str = "Austin";
pub const STATE: &str = "TX";

/// An entity in the default market without a site.
pub fn business(id: &str, name: &str) -> Entity {
    Entity::new(id, name).in_market(INDUSTRY, CITY, Some(STATE))
}

/// An entity in the default market that already has a site.
pub fn business_with_site(id: &str, name: &str, rating: f32, reviews: u32) -> Entity {
    business(id, name)
        .with_target_artifact(&format!("https://{}.example.com", id))
        .with_rating(rating, reviews)
}

/// `count` entities without sites, ids `biz-1` .. `biz-N`.
pub fn businesses(count: usize) -> Vec<Entity> {
    (1..=count)
        .map(|i| business(&format!("biz-{}", i), &format!("Business {}", i)))
        .collect()
}

pub fn request() -> JobRequest {
    JobRequest::new(INDUSTRY, CITY, STATE)
}

pub fn supplied(entities: Vec<Entity>) -> JobRequest {
    request().with_entities(entities)
}
