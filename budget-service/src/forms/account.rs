use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(max = 100, message = "Name must be at most 100 characters."))]
    pub display_name: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match."))]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    pub fn display_name(&self) -> Option<String> {
        let name = self.display_name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PasswordChangeForm {
    #[validate(length(min = 1, message = "Enter your current password."))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters."))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match."))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ForgotPasswordForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

impl ForgotPasswordForm {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ResetPasswordForm {
    pub token: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters."))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match."))]
    pub confirm_password: String,
}
