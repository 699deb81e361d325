//! Mailbox access and reset-token correlation
//!
//! The storefront exposes two HTML mail views: a shared demo inbox that
//! receives every outgoing message, and a per-user inbox behind login.

mod correlator;
mod extract;

pub use correlator::{select_candidates, CorrelationRequest, MailboxCorrelator, MailboxScope};
pub use extract::{extract_first_email_id, HtmlMarkup, MailboxMarkup};

use std::sync::Arc;
use std::time::Duration;

use storefront_common::InboxBox;

use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

pub const SHARED_INBOX_PATH: &str = "/demo-inbox";
pub const SCOPED_INBOX_PATH: &str = "/inbox";

/// Which mail view a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxView {
    /// Every message sent by the storefront
    Shared,
    /// Messages for the logged-in user only
    Scoped,
}

impl MailboxView {
    pub fn base_path(&self) -> &'static str {
        match self {
            MailboxView::Shared => SHARED_INBOX_PATH,
            MailboxView::Scoped => SCOPED_INBOX_PATH,
        }
    }

    pub fn detail_path(&self, id: u64) -> String {
        format!("{}/{}", self.base_path(), id)
    }
}

impl std::fmt::Display for MailboxView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailboxView::Shared => write!(f, "demo inbox"),
            MailboxView::Scoped => write!(f, "private inbox"),
        }
    }
}

/// Raw mail view endpoints
#[derive(Clone)]
pub struct MailboxApi {
    client: Arc<dyn HttpClient>,
    timeout: Option<Duration>,
}

impl MailboxApi {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn html(&self, request: HttpRequest, folder: Option<InboxBox>) -> HttpRequest {
        let request = request.accept_html();
        let request = match folder {
            Some(folder) => request.query("box", folder.as_str()),
            None => request,
        };
        match self.timeout {
            Some(t) => request.timeout(t),
            None => request,
        }
    }

    pub async fn list(&self, view: MailboxView, folder: Option<InboxBox>) -> E2eResult<HttpResponse> {
        let request = self.html(HttpRequest::get(view.base_path()), folder);
        self.client.send(request).await
    }

    pub async fn detail(
        &self,
        view: MailboxView,
        id: u64,
        folder: Option<InboxBox>,
    ) -> E2eResult<HttpResponse> {
        let request = self.html(HttpRequest::get(view.detail_path(id)), folder);
        self.client.send(request).await
    }

    async fn shared_action(&self, id: u64, action: &str, folder: InboxBox) -> E2eResult<HttpResponse> {
        let path = format!("{}/{}/{}", SHARED_INBOX_PATH, id, action);
        let request = self
            .html(HttpRequest::post(path), None)
            .form(&[("box", folder.as_str())]);
        self.client.send(request).await
    }

    /// Move a shared-inbox message from `folder` to the trash
    pub async fn move_to_trash(&self, id: u64, folder: InboxBox) -> E2eResult<HttpResponse> {
        self.shared_action(id, "delete", folder).await
    }

    pub async fn restore(&self, id: u64, folder: InboxBox) -> E2eResult<HttpResponse> {
        self.shared_action(id, "restore", folder).await
    }

    /// Permanently delete a shared-inbox message
    pub async fn destroy(&self, id: u64, folder: InboxBox) -> E2eResult<HttpResponse> {
        self.shared_action(id, "destroy", folder).await
    }

    /// Id of the newest message in a shared-inbox folder
    pub async fn read_first_email_id(&self, folder: InboxBox) -> E2eResult<u64> {
        let response = self.list(MailboxView::Shared, Some(folder)).await?;
        if response.status != 200 {
            return Err(E2eError::UnexpectedStatus {
                path: SHARED_INBOX_PATH.to_string(),
                status: response.status,
            });
        }
        extract_first_email_id(response.text()).ok_or_else(|| {
            E2eError::MissingData(format!(
                "no message in {} folder '{}'",
                MailboxView::Shared,
                folder
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, RequestBody};
    use crate::testing::StubClient;

    #[tokio::test]
    async fn test_list_sends_box_query_and_html_accept() {
        let stub = Arc::new(StubClient::new());
        let api = MailboxApi::new(stub.clone());

        api.list(MailboxView::Scoped, Some(InboxBox::Trash)).await.unwrap();
        api.list(MailboxView::Shared, None).await.unwrap();

        let calls = stub.calls();
        assert_eq!(calls[0].path, "/inbox");
        assert_eq!(calls[0].query, vec![("box".to_string(), "trash".to_string())]);
        assert_eq!(calls[0].header_value("accept"), Some("text/html"));
        assert_eq!(calls[1].path, "/demo-inbox");
        assert!(calls[1].query.is_empty());
    }

    #[tokio::test]
    async fn test_trash_actions_post_box_form() {
        let stub = Arc::new(StubClient::new());
        let api = MailboxApi::new(stub.clone());

        api.move_to_trash(7, InboxBox::Inbox).await.unwrap();
        api.restore(7, InboxBox::Trash).await.unwrap();
        api.destroy(7, InboxBox::Trash).await.unwrap();

        assert_eq!(
            stub.paths(),
            vec!["/demo-inbox/7/delete", "/demo-inbox/7/restore", "/demo-inbox/7/destroy"]
        );
        let calls = stub.calls();
        assert!(calls.iter().all(|c| c.method == Method::Post));
        match &calls[0].body {
            Some(RequestBody::Form(pairs)) => {
                assert_eq!(pairs, &vec![("box".to_string(), "inbox".to_string())]);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_first_email_id() {
        let stub = Arc::new(StubClient::new());
        stub.on_get(
            SHARED_INBOX_PATH,
            [
                HttpResponse::new(200, r#"<li data-testid="inbox-email-item-42"></li>"#),
                HttpResponse::new(200, "<p>Inbox is empty</p>"),
            ],
        );
        let api = MailboxApi::new(stub.clone());

        assert_eq!(api.read_first_email_id(InboxBox::Inbox).await.unwrap(), 42);
        assert!(matches!(
            api.read_first_email_id(InboxBox::Inbox).await,
            Err(E2eError::MissingData(_))
        ));
    }
}
