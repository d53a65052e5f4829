mod schema;
mod store;

pub use store::{ArticleStore, StoreCounts};

#[cfg(test)]
pub(crate) use schema::SCHEMA;
