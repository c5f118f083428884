pub mod binding;
pub mod constraint;
pub mod declarations;
pub mod focus;
pub mod navigator;
pub mod registry;
pub mod rows;
pub mod scheduler;
pub mod schema;
pub mod tracker;
pub mod visibility;
