use super::FormErrors;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CategoryForm {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters."))]
    pub name: String,
}

impl CategoryForm {
    /// Trimmed category name.
    pub fn into_name(&self) -> Result<String, FormErrors> {
        let name = self.name.trim().to_string();
        let trimmed = CategoryForm { name: name.clone() };
        match trimmed.validate() {
            Ok(()) => Ok(name),
            Err(e) => Err(FormErrors::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_validates() {
        let form = CategoryForm {
            name: "  Groceries  ".to_string(),
        };
        assert_eq!(form.into_name().unwrap(), "Groceries");

        let blank = CategoryForm {
            name: "   ".to_string(),
        };
        assert!(blank.into_name().unwrap_err().has("name"));

        let long = CategoryForm {
            name: "n".repeat(51),
        };
        assert!(long.into_name().is_err());
    }
}
