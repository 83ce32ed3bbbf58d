// DDEML client backend (Windows).
//
// One DDEML instance per server handle, conversations tracked in a slot
// table until DdeConnect hands back a real HCONV. Every DDEML failure is
// reported as a Connection error carrying the DdeGetLastError code.

use super::{ConversationId, DdeError, DdeHost, DdeValue, Item, ServerId, ServerTopic};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, OsStr};
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::time::Duration;
use windows::core::PCWSTR;
use windows::Win32::System::DataExchange::{
    DdeClientTransaction, DdeConnect, DdeCreateStringHandleW, DdeDisconnect, DdeFreeDataHandle,
    DdeFreeStringHandle, DdeGetData, DdeGetLastError, DdeInitializeW, DdeUninitialize,
    APPCMD_CLIENTONLY, CBF_FAIL_ADVISES, CBF_FAIL_EXECUTES, HCONV, HDDEDATA, HSZ, XTYP_POKE,
    XTYP_REQUEST,
};
use windows::Win32::UI::WindowsAndMessaging::{PeekMessageW, MSG, PM_NOREMOVE};

const CF_TEXT: u32 = 1;
const CP_WINUNICODE: i32 = 1200;
const DMLERR_NO_ERROR: u32 = 0;

struct ConversationSlot {
    instance: u32,
    hconv: HCONV,
}

/// DDE host backed by the Windows DDE Management Library.
pub struct DdemlHost {
    message_loop_ready: Cell<bool>,
    instances: RefCell<HashSet<u32>>,
    conversations: RefCell<HashMap<u64, ConversationSlot>>,
    next_conversation: Cell<u64>,
    transaction_timeout_ms: u32,
}

impl DdemlHost {
    pub fn new(transaction_timeout: Duration) -> Self {
        Self {
            message_loop_ready: Cell::new(false),
            instances: RefCell::new(HashSet::new()),
            conversations: RefCell::new(HashMap::new()),
            next_conversation: Cell::new(0),
            transaction_timeout_ms: u32::try_from(transaction_timeout.as_millis())
                .unwrap_or(u32::MAX),
        }
    }

    fn slot(&self, conversation: ConversationId) -> Result<(u32, HCONV), DdeError> {
        let slots = self.conversations.borrow();
        let slot = slots
            .get(&conversation.0)
            .ok_or_else(|| DdeError::other(format!("Unknown conversation {}", conversation.0)))?;
        Ok((slot.instance, slot.hconv))
    }

    fn connected(&self, conversation: ConversationId) -> Result<(u32, HCONV), DdeError> {
        let (instance, hconv) = self.slot(conversation)?;
        if hconv.0.is_null() {
            return Err(DdeError::other("Conversation is not connected"));
        }
        Ok((instance, hconv))
    }
}

impl DdeHost for DdemlHost {
    fn init_message_loop(&self) -> Result<(), DdeError> {
        if self.message_loop_ready.get() {
            return Ok(());
        }

        // DDEML posts to the calling thread; peeking forces its queue to exist.
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }

        self.message_loop_ready.set(true);
        debug!("[DDE] Message queue ready on current thread");
        Ok(())
    }

    fn create_server(&self, name: &str) -> Result<ServerId, DdeError> {
        let mut instance: u32 = 0;
        let rc = unsafe {
            DdeInitializeW(
                &mut instance,
                Some(ddeml_callback),
                APPCMD_CLIENTONLY | CBF_FAIL_EXECUTES | CBF_FAIL_ADVISES,
                None,
            )
        };

        if rc != DMLERR_NO_ERROR {
            return Err(DdeError::connection(format!(
                "Create of {} failed: {}",
                name,
                describe_dmlerr(rc)
            )));
        }

        self.instances.borrow_mut().insert(instance);
        debug!("[DDE] Instance {} created for {}", instance, name);
        Ok(ServerId(u64::from(instance)))
    }

    fn destroy_server(&self, server: ServerId) -> Result<(), DdeError> {
        let instance = u32::try_from(server.0)
            .map_err(|_| DdeError::other(format!("Unknown server {}", server.0)))?;

        if !self.instances.borrow_mut().remove(&instance) {
            return Err(DdeError::other(format!("Unknown server {}", server.0)));
        }

        // Uninitializing also terminates conversations still open on it.
        self.conversations
            .borrow_mut()
            .retain(|_, slot| slot.instance != instance);

        let ok = unsafe { DdeUninitialize(instance) };
        if ok.as_bool() {
            Ok(())
        } else {
            Err(DdeError::connection(format!(
                "DdeUninitialize failed for instance {}",
                instance
            )))
        }
    }

    fn create_conversation(&self, server: ServerId) -> Result<ConversationId, DdeError> {
        let instance = u32::try_from(server.0)
            .ok()
            .filter(|i| self.instances.borrow().contains(i))
            .ok_or_else(|| DdeError::other(format!("Unknown server {}", server.0)))?;

        let id = self.next_conversation.get() + 1;
        self.next_conversation.set(id);
        self.conversations.borrow_mut().insert(
            id,
            ConversationSlot {
                instance,
                hconv: HCONV(std::ptr::null_mut()),
            },
        );
        Ok(ConversationId(id))
    }

    fn destroy_conversation(&self, conversation: ConversationId) -> Result<(), DdeError> {
        let slot = self
            .conversations
            .borrow_mut()
            .remove(&conversation.0)
            .ok_or_else(|| DdeError::other(format!("Unknown conversation {}", conversation.0)))?;

        if slot.hconv.0.is_null() {
            return Ok(());
        }

        let ok = unsafe { DdeDisconnect(slot.hconv) };
        if ok.as_bool() {
            Ok(())
        } else {
            Err(last_error(slot.instance, "Disconnect"))
        }
    }

    fn connect(
        &self,
        conversation: ConversationId,
        endpoint: &ServerTopic,
    ) -> Result<(), DdeError> {
        let (instance, previous) = self.slot(conversation)?;
        if !previous.0.is_null() {
            unsafe {
                let _ = DdeDisconnect(previous);
            }
        }

        let service = StringHandle::new(instance, endpoint.server())?;
        let topic = StringHandle::new(instance, endpoint.topic())?;

        let hconv = unsafe { DdeConnect(instance, service.raw(), topic.raw(), None) };
        if hconv.0.is_null() {
            return Err(last_error(instance, "ConnectTo"));
        }

        if let Some(slot) = self.conversations.borrow_mut().get_mut(&conversation.0) {
            slot.hconv = hconv;
        }
        Ok(())
    }

    fn request(&self, conversation: ConversationId, item: &Item) -> Result<DdeValue, DdeError> {
        let (instance, hconv) = self.connected(conversation)?;
        let hsz_item = StringHandle::new(instance, item.name())?;

        let hdata = unsafe {
            DdeClientTransaction(
                None,
                0,
                hconv,
                Some(hsz_item.raw()),
                CF_TEXT,
                XTYP_REQUEST,
                self.transaction_timeout_ms,
                None,
            )
        };
        if hdata.0.is_null() {
            return Err(last_error(instance, "Request"));
        }

        let bytes = unsafe { read_data(hdata) };
        unsafe {
            let _ = DdeFreeDataHandle(hdata);
        }

        Ok(DdeValue::from_bytes(strip_terminator(bytes)))
    }

    fn poke(
        &self,
        conversation: ConversationId,
        item: &Item,
        value: &str,
    ) -> Result<(), DdeError> {
        let (instance, hconv) = self.connected(conversation)?;
        let hsz_item = StringHandle::new(instance, item.name())?;

        let mut payload = value.as_bytes().to_vec();
        payload.push(0);
        let len = u32::try_from(payload.len())
            .map_err(|_| DdeError::other("Poke payload too large"))?;

        let result = unsafe {
            DdeClientTransaction(
                Some(payload.as_ptr()),
                len,
                hconv,
                Some(hsz_item.raw()),
                CF_TEXT,
                XTYP_POKE,
                self.transaction_timeout_ms,
                None,
            )
        };
        if result.0.is_null() {
            return Err(last_error(instance, "Poke"));
        }
        Ok(())
    }
}

impl Drop for DdemlHost {
    fn drop(&mut self) {
        for (_, slot) in self.conversations.borrow_mut().drain() {
            if !slot.hconv.0.is_null() {
                unsafe {
                    let _ = DdeDisconnect(slot.hconv);
                }
            }
        }
        for instance in self.instances.borrow_mut().drain() {
            warn!("[DDE] Instance {} still open at shutdown - releasing", instance);
            unsafe {
                let _ = DdeUninitialize(instance);
            }
        }
    }
}

/// DDEML string handle freed on drop.
struct StringHandle {
    instance: u32,
    hsz: HSZ,
}

impl StringHandle {
    fn new(instance: u32, text: &str) -> Result<Self, DdeError> {
        if text.contains('\0') {
            return Err(DdeError::other(format!(
                "Name contains an embedded NUL: {:?}",
                text
            )));
        }

        let wide = to_wide(text);
        let hsz = unsafe { DdeCreateStringHandleW(instance, PCWSTR(wide.as_ptr()), CP_WINUNICODE) };
        if hsz.0.is_null() {
            return Err(last_error(instance, "CreateStringHandle"));
        }
        Ok(Self { instance, hsz })
    }

    fn raw(&self) -> HSZ {
        self.hsz
    }
}

impl Drop for StringHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = DdeFreeStringHandle(self.instance, self.hsz);
        }
    }
}

unsafe extern "system" fn ddeml_callback(
    _wtype: u32,
    _wfmt: u32,
    _hconv: HCONV,
    _hsz1: HSZ,
    _hsz2: HSZ,
    _hdata: HDDEDATA,
    _dwdata1: usize,
    _dwdata2: usize,
) -> HDDEDATA {
    HDDEDATA(std::ptr::null_mut::<c_void>())
}

unsafe fn read_data(hdata: HDDEDATA) -> Vec<u8> {
    let size = DdeGetData(hdata, None, 0);
    let mut buffer = vec![0u8; size as usize];
    if size > 0 {
        let copied = DdeGetData(hdata, Some(&mut buffer), 0);
        buffer.truncate(copied as usize);
    }
    buffer
}

/// Drop the CF_TEXT NUL terminator and anything after it.
fn strip_terminator(mut bytes: Vec<u8>) -> Vec<u8> {
    if let Some(pos) = bytes.iter().position(|b| *b == 0) {
        bytes.truncate(pos);
    }
    bytes
}

fn last_error(instance: u32, operation: &str) -> DdeError {
    let code = unsafe { DdeGetLastError(instance) };
    DdeError::connection(format!("{} failed: {}", operation, describe_dmlerr(code)))
}

fn describe_dmlerr(code: u32) -> String {
    let name = match code {
        0x4000 => "DMLERR_ADVACKTIMEOUT",
        0x4001 => "DMLERR_BUSY",
        0x4002 => "DMLERR_DATAACKTIMEOUT",
        0x4003 => "DMLERR_DLL_NOT_INITIALIZED",
        0x4004 => "DMLERR_DLL_USAGE",
        0x4005 => "DMLERR_EXECACKTIMEOUT",
        0x4006 => "DMLERR_INVALIDPARAMETER",
        0x4007 => "DMLERR_LOW_MEMORY",
        0x4008 => "DMLERR_MEMORY_ERROR",
        0x4009 => "DMLERR_NOTPROCESSED",
        0x400a => "DMLERR_NO_CONV_ESTABLISHED",
        0x400b => "DMLERR_POKEACKTIMEOUT",
        0x400c => "DMLERR_POSTMSG_FAILED",
        0x400d => "DMLERR_REENTRANCY",
        0x400e => "DMLERR_SERVER_DIED",
        0x400f => "DMLERR_SYS_ERROR",
        0x4010 => "DMLERR_UNADVACKTIMEOUT",
        0x4011 => "DMLERR_UNFOUND_QUEUE_ID",
        _ => "unknown DDE error",
    };
    format!("{} (0x{:04x})", name, code)
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(once(0)).collect()
}
