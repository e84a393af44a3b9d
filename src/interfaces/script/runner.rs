use super::step::ScriptStep;
use crate::application::coordinator::{ContextUpdate, PaymentBridge, PaymentConfirmation};
use crate::application::key_relay::{KeyCompletion, KeyRequest, NativeKeyReceiver};
use crate::domain::callback::{CallbackEvent, CallbackReceiver, CorrelationId, HostCallback};
use crate::domain::session::{LoadFailure, PaymentCreated, PaymentOutcome};
use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Write;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot::error::TryRecvError as CompletionTryRecvError;
use tokio::task::JoinHandle;
use tracing::debug;

/// How often the runner yields after a step so spawned payment requests can
/// reach their next suspension point.
const SETTLE_YIELDS: usize = 16;

struct Subscription<T> {
    registration: usize,
    receiver: CallbackReceiver<T>,
}

/// Plays scenario steps against a bridge, acting as the host.
///
/// After every step the runner drains whatever the bridge delivered, in a
/// fixed order: key requests, load failures, change notifications, created
/// payments, native key completions, finished payment requests.
pub struct ScriptRunner<W: Write> {
    bridge: PaymentBridge,
    out: W,
    registrations: usize,
    key_requests: Vec<Subscription<KeyRequest>>,
    load_failures: Vec<Subscription<LoadFailure>>,
    changes: Vec<Subscription<()>>,
    payments_created: Vec<Subscription<PaymentCreated>>,
    native_keys: Vec<NativeKeyReceiver>,
    payments: Vec<JoinHandle<Result<PaymentOutcome>>>,
    last_key_request: Option<CorrelationId>,
    last_payment: Option<CorrelationId>,
}

impl<W: Write> ScriptRunner<W> {
    pub fn new(bridge: PaymentBridge, out: W) -> Self {
        Self {
            bridge,
            out,
            registrations: 0,
            key_requests: Vec::new(),
            load_failures: Vec::new(),
            changes: Vec::new(),
            payments_created: Vec::new(),
            native_keys: Vec::new(),
            payments: Vec::new(),
            last_key_request: None,
            last_payment: None,
        }
    }

    /// Executes one step and writes everything it caused.
    ///
    /// Bridge failures are reported as `error` events; only output failures
    /// are returned.
    pub async fn step(&mut self, step: ScriptStep) -> Result<()> {
        let op = step.name();
        debug!(op, "running step");
        match self.execute(step).await {
            Ok(Some(result)) => self.emit(result)?,
            Ok(None) => {}
            Err(e) => self.emit(json!({"event": "error", "op": op, "message": e.to_string()}))?,
        }
        self.settle().await;
        self.drain().await
    }

    /// Drains the remaining events and reports anything still suspended.
    pub async fn finish(mut self) -> Result<W> {
        self.settle().await;
        self.drain().await?;
        for handle in std::mem::take(&mut self.payments) {
            handle.abort();
            self.emit(json!({"event": "paymentPending"}))?;
        }
        for _ in 0..self.native_keys.len() {
            self.emit(json!({"event": "nativeKeyPending"}))?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    async fn execute(&mut self, step: ScriptStep) -> Result<Option<Value>> {
        let op = step.name();
        match step {
            ScriptStep::SetCredential { key } => self.bridge.set_credential(&key).await?,
            ScriptStep::SetKeyCallback => {
                let (callback, receiver) = HostCallback::channel();
                self.bridge.set_key_callback(callback).await;
                let subscription = self.subscribe(receiver);
                self.key_requests.push(subscription);
            }
            ScriptStep::KeyCallbackCompleted {
                correlation_id,
                response,
                error,
            } => {
                let correlation_id = correlation_id
                    .or_else(|| self.last_key_request.clone())
                    .ok_or_else(|| {
                        BridgeError::InvalidState("no key request has been delivered".to_string())
                    })?;
                self.bridge
                    .key_callback_completed(KeyCompletion {
                        correlation_id,
                        response,
                        error,
                    })
                    .await?;
            }
            ScriptStep::SetConfiguration { config } => self.bridge.set_configuration(config).await?,
            ScriptStep::UpdateContext { amount, currency } => {
                self.bridge
                    .update_context(ContextUpdate { amount, currency })
                    .await?;
            }
            ScriptStep::SetFailedToLoadCallback => {
                let (callback, receiver) = HostCallback::channel();
                self.bridge.set_failed_to_load_callback(callback).await;
                let subscription = self.subscribe(receiver);
                self.load_failures.push(subscription);
            }
            ScriptStep::SetChangedCallback => {
                let (callback, receiver) = HostCallback::channel();
                self.bridge.set_changed_callback(callback).await;
                let subscription = self.subscribe(receiver);
                self.changes.push(subscription);
            }
            ScriptStep::SetPaymentCreatedCallback => {
                let (callback, receiver) = HostCallback::channel();
                self.bridge.set_payment_created_callback(callback).await;
                let subscription = self.subscribe(receiver);
                self.payments_created.push(subscription);
            }
            ScriptStep::RequestPayment => {
                let bridge = self.bridge.clone();
                self.payments
                    .push(tokio::spawn(async move { bridge.request_payment().await }));
            }
            ScriptStep::PaymentCreatedCompleted {
                correlation_id,
                error,
            } => {
                let correlation_id = correlation_id
                    .or_else(|| self.last_payment.clone())
                    .ok_or_else(|| {
                        BridgeError::InvalidState("no payment has been created".to_string())
                    })?;
                self.bridge
                    .payment_created_completed(PaymentConfirmation {
                        correlation_id,
                        error,
                    })
                    .await?;
            }
            ScriptStep::CurrentOption => {
                let option = self.bridge.current_option().await;
                return Ok(Some(json!({"event": op, "value": option})));
            }
            ScriptStep::ClearContext => self.bridge.clear_context().await?,
            ScriptStep::ShowPaymentOptions => self.bridge.show_payment_options().await?,
            ScriptStep::RetryLoading => self.bridge.retry_loading().await?,
            ScriptStep::WalletAvailability => {
                let availability = self.bridge.wallet_availability().await?;
                return Ok(Some(json!({"event": op, "available": availability.available})));
            }
            ScriptStep::Phase => {
                let phase = self.bridge.phase().await;
                return Ok(Some(json!({"event": op, "value": phase})));
            }
            ScriptStep::KeyRequested { api_version } => {
                let receiver = self.bridge.on_key_requested(&api_version).await;
                self.native_keys.push(receiver);
            }
            ScriptStep::LoadingChanged { is_loading } => {
                self.bridge.on_loading_changed(is_loading).await;
            }
            ScriptStep::LoadFailed { code, message } => {
                self.bridge.on_load_failed(code, &message).await;
            }
            ScriptStep::SelectionChanged { state } => {
                self.bridge.on_selection_changed(state).await?;
            }
            ScriptStep::PaymentFinished { result } => {
                self.bridge.on_payment_finished(result).await;
            }
            ScriptStep::WalletResult { result } => {
                let resumed = self.bridge.on_wallet_result(result);
                return Ok(Some(json!({"event": op, "resumed": resumed})));
            }
        }
        Ok(None)
    }

    fn subscribe<T>(&mut self, receiver: CallbackReceiver<T>) -> Subscription<T> {
        self.registrations += 1;
        Subscription {
            registration: self.registrations,
            receiver,
        }
    }

    async fn settle(&self) {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    async fn drain(&mut self) -> Result<()> {
        for (registration, event) in take_events(&mut self.key_requests) {
            if let CallbackEvent::Delivered(request) = &event {
                self.last_key_request = Some(request.correlation_id.clone());
            }
            self.emit(callback_event("keyRequest", registration, &event))?;
        }
        for (registration, event) in take_events(&mut self.load_failures) {
            self.emit(callback_event("loadFailed", registration, &event))?;
        }
        for (registration, event) in take_events(&mut self.changes) {
            self.emit(callback_event("changed", registration, &event))?;
        }
        for (registration, event) in take_events(&mut self.payments_created) {
            if let CallbackEvent::Delivered(created) = &event {
                self.last_payment = Some(created.correlation_id.clone());
            }
            self.emit(callback_event("paymentCreated", registration, &event))?;
        }

        let mut waiting = Vec::new();
        for mut receiver in std::mem::take(&mut self.native_keys) {
            let event = match receiver.try_recv() {
                Ok(Ok(key)) => json!({"event": "nativeKey", "key": key}),
                Ok(Err(e)) => json!({"event": "nativeKey", "error": e.to_string()}),
                Err(CompletionTryRecvError::Empty) => {
                    waiting.push(receiver);
                    continue;
                }
                Err(CompletionTryRecvError::Closed) => {
                    json!({"event": "nativeKey", "error": "completion handle dropped"})
                }
            };
            self.emit(event)?;
        }
        self.native_keys = waiting;

        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.payments)
            .into_iter()
            .partition(JoinHandle::is_finished);
        self.payments = running;
        for handle in finished {
            let event = match handle.await {
                Ok(Ok(outcome)) => json!({"event": "paymentResult", "outcome": outcome}),
                Ok(Err(e)) => json!({"event": "paymentResult", "error": e.to_string()}),
                Err(e) => json!({"event": "paymentResult", "error": e.to_string()}),
            };
            self.emit(event)?;
        }
        Ok(())
    }

    fn emit(&mut self, event: Value) -> Result<()> {
        serde_json::to_writer(&mut self.out, &event)?;
        writeln!(self.out)?;
        Ok(())
    }
}

fn take_events<T>(subscriptions: &mut Vec<Subscription<T>>) -> Vec<(usize, CallbackEvent<T>)> {
    let mut events = Vec::new();
    subscriptions.retain_mut(|subscription| loop {
        match subscription.receiver.try_recv() {
            Ok(event) => events.push((subscription.registration, event)),
            Err(TryRecvError::Empty) => break true,
            Err(TryRecvError::Disconnected) => break false,
        }
    });
    events
}

fn callback_event<T: Serialize>(kind: &str, registration: usize, event: &CallbackEvent<T>) -> Value {
    match event {
        CallbackEvent::Delivered(payload) => {
            json!({"event": kind, "registration": registration, "payload": payload})
        }
        CallbackEvent::Failed(e) => {
            json!({"event": kind, "registration": registration, "error": e.to_string()})
        }
        CallbackEvent::Released(reason) => json!({
            "event": "released",
            "callback": kind,
            "registration": registration,
            "reason": reason,
        }),
    }
}
