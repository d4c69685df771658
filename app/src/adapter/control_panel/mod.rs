mod http_server;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::derive::{Display, Error};

use crate::actuator::ControlError;
use crate::control::{ControlClient, TimerRequestError};

pub fn new_routes(client: ControlClient) -> actix_web::Scope {
    http_server::new_actix_web_scope(client)
}

type ControlPanelResponse = Result<HttpResponse, ControlPanelError>;

#[derive(Debug, Error, Display)]
enum ControlPanelError {
    #[display("{reason}")]
    Rejected { reason: ControlError },

    #[display("Invalid timer time {value:?}")]
    InvalidTime { value: String },

    #[display("Backend request failed: {message}")]
    Backend { message: String },
}

impl From<ControlError> for ControlPanelError {
    fn from(reason: ControlError) -> Self {
        ControlPanelError::Rejected { reason }
    }
}

impl From<TimerRequestError> for ControlPanelError {
    fn from(e: TimerRequestError) -> Self {
        match e {
            TimerRequestError::Rejected { reason } => ControlPanelError::Rejected { reason },
            TimerRequestError::Backend { message } => ControlPanelError::Backend { message },
        }
    }
}

impl ResponseError for ControlPanelError {
    fn status_code(&self) -> StatusCode {
        tracing::warn!("ControlPanelError: {:?}", self);

        match self {
            ControlPanelError::Rejected { reason } => match reason {
                ControlError::Faulted
                | ControlError::AlreadyOpen
                | ControlError::AlreadyClosed
                | ControlError::Moving
                | ControlError::NoTarget => StatusCode::CONFLICT,
                ControlError::TargetOutOfRange | ControlError::OpeningOutOfRange => StatusCode::BAD_REQUEST,
                ControlError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            },
            ControlPanelError::InvalidTime { .. } => StatusCode::BAD_REQUEST,
            ControlPanelError::Backend { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}
