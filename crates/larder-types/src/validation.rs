use thiserror::Error;

use crate::models::RecipeFields;

pub const MIN_PASSWORD_LEN: usize = 6;

/// 2 MiB upload limit for recipe images
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Form-level problems caught before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please fill in all required fields.")]
    MissingRequiredField,
    #[error("Please fill in all ingredients or remove empty ones.")]
    BlankIngredient,
    #[error("Please fill in all preparation steps.")]
    BlankStep,
    #[error("Please upload a recipe image.")]
    MissingImage,
    #[error("Image size must be less than 2MB")]
    ImageTooLarge,
    #[error("Please upload a valid image file")]
    NotAnImage,
    #[error("Password must be at least 6 characters.")]
    WeakPassword,
    #[error("Passwords do not match!")]
    PasswordMismatch,
    #[error("Please enter a valid email address.")]
    InvalidEmail,
}

pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Checks shared by the registration form and the register endpoint.
pub fn validate_registration(
    email: &str,
    password: &str,
    display_name: &str,
) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() || display_name.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField);
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ValidationError::InvalidEmail),
    }
    if !is_strong_password(password) {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

pub fn validate_image(content_type: &str, size: usize) -> Result<(), ValidationError> {
    if size > MAX_IMAGE_BYTES {
        return Err(ValidationError::ImageTooLarge);
    }
    if !content_type.starts_with("image/") {
        return Err(ValidationError::NotAnImage);
    }
    Ok(())
}

/// Text-field checks that apply to every recipe submission. The image rule
/// depends on where the image comes from and is checked by the caller.
pub fn validate_recipe_text(
    title: &str,
    description: &str,
    ingredients: &[String],
    steps: &[String],
) -> Result<(), ValidationError> {
    if title.trim().is_empty() || description.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField);
    }
    if ingredients.is_empty() || ingredients.iter().any(|i| i.trim().is_empty()) {
        return Err(ValidationError::BlankIngredient);
    }
    if steps.is_empty() || steps.iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::BlankStep);
    }
    Ok(())
}

impl RecipeFields {
    /// Full check of a resolved submission, image reference included.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_recipe_text(&self.title, &self.description, &self.ingredients, &self.steps)?;
        if self.image_url.trim().is_empty() {
            return Err(ValidationError::MissingImage);
        }
        Ok(())
    }
}
