use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: impl Into<BackendError>) -> Self {
        Rejection {
            context,
            error: error.into(),
        }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Schedule { schedule: String },
    Schedules,
    Theme { theme: String },
    Themes,
    Upload { filename: Option<String> },
    Delete { scope: String },
}

impl Context {
    pub fn schedule(schedule: String) -> Context {
        Context::Schedule { schedule }
    }

    pub fn schedules() -> Context {
        Context::Schedules
    }

    pub fn theme(theme: String) -> Context {
        Context::Theme { theme }
    }

    pub fn themes() -> Context {
        Context::Themes
    }

    pub fn upload(filename: Option<String>) -> Context {
        Context::Upload { filename }
    }

    pub fn delete(scope: String) -> Context {
        Context::Delete { scope }
    }
}
