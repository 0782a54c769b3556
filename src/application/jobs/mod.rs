mod consistency;
mod warm_recent;

pub use consistency::{
    ConsistencyCheckContext, ConsistencyCheckJob, process_consistency_check_job,
};
pub use warm_recent::{
    WarmRecentImagesContext, WarmRecentImagesJob, process_warm_recent_images_job,
};
