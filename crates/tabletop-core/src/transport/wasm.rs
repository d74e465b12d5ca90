//! Browser WebSocket transport.

use super::{Transport, TransportError, TransportEvent};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, ErrorEvent, MessageEvent, WebSocket};

/// WebSocket transport for WASM.
///
/// Callbacks push into a shared queue drained by `poll_events()`.
pub struct WasmTransport {
    ws: Option<WebSocket>,
    events: Rc<RefCell<Vec<TransportEvent>>>,
    // Closures must outlive the socket callbacks
    _on_open: Option<Closure<dyn Fn()>>,
    _on_message: Option<Closure<dyn Fn(MessageEvent)>>,
    _on_close: Option<Closure<dyn Fn(CloseEvent)>>,
    _on_error: Option<Closure<dyn Fn(ErrorEvent)>>,
}

impl WasmTransport {
    pub fn new() -> Self {
        Self {
            ws: None,
            events: Rc::new(RefCell::new(Vec::new())),
            _on_open: None,
            _on_message: None,
            _on_close: None,
            _on_error: None,
        }
    }

    fn detach(&mut self) {
        if let Some(ws) = self.ws.take() {
            ws.set_onopen(None);
            ws.set_onmessage(None);
            ws.set_onclose(None);
            ws.set_onerror(None);
        }
        self._on_open = None;
        self._on_message = None;
        self._on_close = None;
        self._on_error = None;
    }
}

impl Default for WasmTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WasmTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        if self.ws.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let ws = WebSocket::new(url).map_err(|e| TransportError::Other(format!("{:?}", e)))?;
        // Fresh queue so stale events of a previous socket cannot leak in.
        self.events = Rc::new(RefCell::new(Vec::new()));

        let events_open = self.events.clone();
        let on_open = Closure::wrap(Box::new(move || {
            events_open.borrow_mut().push(TransportEvent::Opened);
        }) as Box<dyn Fn()>);
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let events_msg = self.events.clone();
        let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
            if let Ok(txt) = e.data().dyn_into::<js_sys::JsString>() {
                events_msg.borrow_mut().push(TransportEvent::Message(txt.into()));
            }
        }) as Box<dyn Fn(MessageEvent)>);
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        let events_close = self.events.clone();
        let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
            events_close
                .borrow_mut()
                .push(TransportEvent::Closed { code: e.code() });
        }) as Box<dyn Fn(CloseEvent)>);
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let events_err = self.events.clone();
        let on_error = Closure::wrap(Box::new(move |_e: ErrorEvent| {
            events_err
                .borrow_mut()
                .push(TransportEvent::Error("WebSocket error".to_string()));
        }) as Box<dyn Fn(ErrorEvent)>);
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        self.ws = Some(ws);
        self._on_open = Some(on_open);
        self._on_message = Some(on_message);
        self._on_close = Some(on_close);
        self._on_error = Some(on_error);
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        match self.ws {
            Some(ref ws) => ws
                .send_with_str(text)
                .map_err(|e| TransportError::Send(format!("{:?}", e))),
            None => Err(TransportError::NotConnected),
        }
    }

    fn close(&mut self, code: u16) {
        if let Some(ref ws) = self.ws {
            let _ = ws.close_with_code(code);
        }
        self.detach();
        self.events.borrow_mut().clear();
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let events = std::mem::take(&mut *self.events.borrow_mut());
        if events
            .iter()
            .any(|e| matches!(e, TransportEvent::Closed { .. }))
        {
            self.detach();
        }
        events
    }
}

impl Drop for WasmTransport {
    fn drop(&mut self) {
        self.close(super::CLOSE_NORMAL);
    }
}
