//! Wire protocol for the client / extension-host boundary.

pub mod channel;
pub mod codec;
pub mod envelope;

pub use channel::{Endpoint, EndpointError, Inbound};
pub use codec::{FrameReader, FrameWriter};
pub use envelope::{
    Ack, AcceptDiagnosticsDataParams, AcceptSearchResultsParams, FindTextInFilesParams,
    FindTextInFilesResult, InitializeParams, Message, Notification, ProvideTextSearchResultsParams,
    ProvideTextSearchResultsResult, RegisterProviderParams, RegisterProviderResult, Request,
    Response, ResponseError, TransformQueryParams, TransformQueryResult, UnregisterParams, codes,
    methods, parse_params,
};
