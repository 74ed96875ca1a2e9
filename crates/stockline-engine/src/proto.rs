//! gRPC client for the company service's role lookup.
//!
//! Only `GetPosRoleById` is consumed, so the messages and the client stub are
//! declared here with `prost` derives instead of running a protobuf build
//! step. Wire shape:
//!
//! ```text
//! service CompanyService {
//!   rpc GetPosRoleById(GetPosRoleByIdRequest) returns (GetPosRoleByIdResponse);
//! }
//! message JwtPayload            { user_id = 1; role_id = 2; company_id = 3;
//!                                 branch_id = 4; store_id = 5; }   // strings
//! message GetPosRoleByIdRequest { string role_id = 1; JwtPayload jwt_payload = 2; }
//! message PosRole               { string role_id = 1; string role_name = 2; }
//! message GetPosRoleByIdResponse{ PosRole pos_role = 1; }
//! ```

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// Decoded caller token, forwarded verbatim to the role service.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JwtPayload {
    #[prost(string, tag = "1")]
    pub user_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub role_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub company_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub branch_id: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub store_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPosRoleByIdRequest {
    #[prost(string, tag = "1")]
    pub role_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub jwt_payload: ::core::option::Option<JwtPayload>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PosRole {
    #[prost(string, tag = "1")]
    pub role_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub role_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPosRoleByIdResponse {
    #[prost(message, optional, tag = "1")]
    pub pos_role: ::core::option::Option<PosRole>,
}

const GET_POS_ROLE_BY_ID: &str = "/pb.CompanyService/GetPosRoleById";

/// Client stub for `CompanyService`.
#[derive(Debug, Clone)]
pub struct CompanyServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CompanyServiceClient {
    pub fn new(channel: Channel) -> Self {
        CompanyServiceClient {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn get_pos_role_by_id(
        &mut self,
        request: impl tonic::IntoRequest<GetPosRoleByIdRequest>,
    ) -> Result<tonic::Response<GetPosRoleByIdResponse>, tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("Service was not ready: {e}")))?;

        let codec: ProstCodec<GetPosRoleByIdRequest, GetPosRoleByIdResponse> = ProstCodec::default();
        let path = PathAndQuery::from_static(GET_POS_ROLE_BY_ID);
        self.inner.unary(request.into_request(), path, codec).await
    }
}
