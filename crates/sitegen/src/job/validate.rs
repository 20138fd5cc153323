use std::collections::HashSet;

use super::record::JobRequest;
use crate::error::JobError;

/// Rejects malformed requests before a job record is created.
pub fn validate_request(request: &JobRequest) -> Result<(), JobError> {
    for (field, value) in [
        ("industry", &request.industry),
        ("city", &request.city),
        ("state", &request.state),
    ] {
        if value.trim().is_empty() {
            return Err(JobError::Validation(format!("'{}' must not be empty", field)));
        }
    }

    if request.limit == Some(0) {
        return Err(JobError::Validation(
            "'limit' must be greater than zero".to_string(),
        ));
    }

    if let Some(entities) = &request.entities {
        let mut ids = HashSet::new();
        for entity in entities {
            if entity.id.trim().is_empty() {
                return Err(JobError::Validation(format!(
                    "Entity '{}' has an empty id",
                    entity.name
                )));
            }
            if entity.name.trim().is_empty() {
                return Err(JobError::Validation(format!(
                    "Entity '{}' has an empty name",
                    entity.id
                )));
            }
            if !ids.insert(entity.id.as_str()) {
                return Err(JobError::Validation(format!(
                    "Duplicate entity id '{}'",
                    entity.id
                )));
            }
        }
    }

    Ok(())
}
