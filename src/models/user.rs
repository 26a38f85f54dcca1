use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

lazy_static! {
    static ref MOBILE: Regex = Regex::new(r"^\d{10}$").unwrap();
}

/// Form submitted when an admin creates a user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUserForm {
    #[validate(length(min = 1, message = "Must Provide First name"))]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[validate(custom = "validate_mobile")]
    pub mobile_no: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Must Provide Role Profile"))]
    pub role_profile: String,
}

/// Form submitted when a vendor is onboarded.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewVendorForm {
    #[validate(length(min = 1, message = "Must Provide Vendor name"))]
    pub vendor_name: String,
    #[validate(custom = "validate_mobile")]
    pub vendor_mobile: String,
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub vendor_email: Option<String>,
    #[serde(default)]
    #[validate(length(equal = 15, message = "GST Number must be of 15 characters"))]
    pub vendor_gst: Option<String>,
    #[validate(length(min = 1, message = "Must Provide City"))]
    pub vendor_city: String,
    #[validate(length(min = 1, message = "Must Provide State"))]
    pub vendor_state: String,
}

fn validate_mobile(mobile: &str) -> Result<(), ValidationError> {
    if MOBILE.is_match(mobile) {
        Ok(())
    } else {
        let mut err = ValidationError::new("mobile");
        err.message = Some(Cow::Borrowed("Mobile number must be of 10 digits"));
        Err(err)
    }
}
