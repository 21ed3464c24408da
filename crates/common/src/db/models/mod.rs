//! SeaORM entity models for the document store

mod document;

pub use document::{
    active_model_from, ActiveModel as DocumentActiveModel, Column as DocumentColumn,
    Entity as DocumentEntity, Model as DocumentRecord,
};
