pub mod budget;
pub mod category;
pub mod entry;
pub mod user;

pub use budget::{Budget, BudgetInput, BudgetWrite};
pub use category::Category;
pub use entry::{Entry, EntryInput, EntryType};
pub use user::{AuthUser, User};
