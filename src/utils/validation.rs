use validator::{Validate, ValidationError};

use crate::errors::AppError;

pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(|err| {
        let mut details = err
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let errors = errs
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message.as_deref().unwrap_or("")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: [{}]", field, errors)
            })
            .collect::<Vec<_>>();
        // field_errors is a HashMap, keep the message stable
        details.sort();
        AppError::Validation(details.join("; "))
    })
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Payload {
        #[validate(custom = "validate_not_blank")]
        name: String,
        #[validate(custom = "validate_not_blank")]
        department: String,
    }

    #[test]
    fn lists_every_failing_field() {
        let payload = Payload { name: " ".into(), department: "".into() };
        match validate_payload(&payload) {
            Err(AppError::Validation(details)) => {
                assert_eq!(
                    details,
                    "department: [blank: must not be empty]; name: [blank: must not be empty]"
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn accepts_filled_fields() {
        let payload = Payload { name: "Ana".into(), department: "R&D".into() };
        assert!(validate_payload(&payload).is_ok());
    }
}
