use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Deleted {
        message: String,
    },
    Healthz {
        service: &'a str,
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Upload {
        presigned_url: String,
    },
}
