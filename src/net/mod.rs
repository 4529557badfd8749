pub mod intercept;
pub mod lists;
