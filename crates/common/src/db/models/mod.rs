//! SeaORM entity models
//!
//! Database entities for ScrapeForge

mod artifact;
mod scrape_job;

pub use scrape_job::{
    Entity as ScrapeJobEntity,
    Model as ScrapeJob,
    ActiveModel as ScrapeJobActiveModel,
    Column as ScrapeJobColumn,
    JobStatus,
};

pub use artifact::{
    Entity as ArtifactEntity,
    Model as Artifact,
    ActiveModel as ArtifactActiveModel,
    Column as ArtifactColumn,
};
