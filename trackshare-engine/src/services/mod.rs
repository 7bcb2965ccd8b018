//! Reconciliation services
//!
//! Webhook side: `event_verifier` → `db::ledger` → `subscription_reconciler`,
//! wired together by `webhook_processor`. Sweep side: `retention_policy` →
//! `expiration_scanner` → `archival_executor` → `notification_dispatcher`,
//! wired together by `sweep_runner` and triggered by `sweep_scheduler` or HTTP.

pub mod archival_executor;
pub mod billing_client;
pub mod billing_event;
pub mod customer_resolver;
pub mod event_verifier;
pub mod expiration_scanner;
pub mod notification_dispatcher;
pub mod notifier;
pub mod object_store;
pub mod retention_policy;
pub mod subscription_reconciler;
pub mod sweep_runner;
pub mod sweep_scheduler;
pub mod webhook_processor;

pub use archival_executor::{ArchivalExecutor, ArchivalReport};
pub use billing_client::{BillingProvider, NewCustomer, ProviderError, StripeClient};
pub use billing_event::{BillingEvent, EventKind};
pub use customer_resolver::{CustomerError, CustomerResolver};
pub use event_verifier::{EventVerifier, VerificationError, SIGNATURE_HEADER};
pub use expiration_scanner::ExpirationScanner;
pub use notification_dispatcher::{ExpirationNotice, NotificationDispatcher};
pub use notifier::{LogNotifier, MailRelayNotifier, Notifier, NotifyError};
pub use object_store::{DeletionReport, ObjectStore, StorageClient, StorageError};
pub use retention_policy::RetentionPolicy;
pub use sweep_runner::{SweepError, SweepOutcome, SweepRunner, SweepSettings, SweepSummary, SweepTrigger};
pub use sweep_scheduler::SweepScheduler;
pub use webhook_processor::{WebhookError, WebhookOutcome, WebhookProcessor};
