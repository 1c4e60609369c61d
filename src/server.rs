//! HTTP endpoint serving the membership report

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use tracing::{info, warn};
use warp::http::{header, StatusCode};
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::cluster::MembershipReporter;
use crate::error::{BootstrapError, BootstrapResult};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Any request returns the current report as plain text
pub fn routes(
    reporter: MembershipReporter,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    warp::any()
        .map(move || reporter.clone())
        .map(|reporter: MembershipReporter| report_response(&reporter))
        .with(warp::log("tagmesh::report"))
}

fn report_response(reporter: &MembershipReporter) -> Response {
    let (body, status) = match reporter.report() {
        Ok(body) => (body, StatusCode::OK),
        Err(e) => {
            warn!("membership report unavailable: {}", e);
            (format!("{}\n", e), StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    warp::reply::with_header(
        warp::reply::with_status(body, status),
        header::CONTENT_TYPE,
        TEXT_PLAIN,
    )
    .into_response()
}

/// Serve the report on all interfaces until `shutdown` resolves
pub async fn serve<F>(reporter: MembershipReporter, port: u16, shutdown: F) -> BootstrapResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind: SocketAddr = ([0, 0, 0, 0], port).into();
    let (addr, server) = warp::serve(routes(reporter))
        .try_bind_with_graceful_shutdown(bind, shutdown)
        .map_err(|e| BootstrapError::Serve(e.to_string()))?;
    info!(%addr, "membership report listening");
    server.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterHandle;
    use crate::types::MemberRecord;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use uuid::Uuid;

    struct SwitchableHandle {
        up: Mutex<bool>,
    }

    impl ClusterHandle for SwitchableHandle {
        fn members(&self) -> BootstrapResult<Vec<MemberRecord>> {
            if !*self.up.lock() {
                return Err(BootstrapError::RuntimeUnavailable("down".to_string()));
            }
            Ok(vec![MemberRecord {
                canonical_hostname: "a.example.com".to_string(),
                ip_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                port: 5701,
                unique_id: Uuid::nil(),
                is_local: true,
            }])
        }
        fn local_id(&self) -> Uuid {
            Uuid::nil()
        }
        fn shutdown(&self) {
            *self.up.lock() = false;
        }
    }

    #[tokio::test]
    async fn test_report_endpoint() {
        let handle = Arc::new(SwitchableHandle { up: Mutex::new(true) });
        let filter = routes(MembershipReporter::new(handle.clone()));

        let response = warp::test::request().path("/anything").reply(&filter).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], TEXT_PLAIN);
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.starts_with(" me -> a.example.com (10.0.0.1) : 5701 - "));

        handle.shutdown();
        let response = warp::test::request().method("POST").reply(&filter).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
