//! BLE provisioning adapter.
//!
//! Implements [`ProvisioningPort`]: a GATT server that accepts the network
//! id, network secret and session token from a phone and reports connection
//! progress through a notify characteristic.
//!
//! Bluedroid calls back on its own task through C function pointers.  The
//! GATTS handler translates connects, disconnects and characteristic writes
//! into [`PeerEvent`]s on a static `embassy-sync` channel, which the
//! lifecycle task awaits in [`next_event`](ProvisioningPort::next_event).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation; tests feed peer events into the
//!   channel and read back the notified payloads.
//!
//! ## GATT Service Layout
//!
//! | Characteristic   | UUID                           | Props  |
//! |------------------|--------------------------------|--------|
//! | Network id       | `12345678-…-56789abcdef1`      | Write  |
//! | Network secret   | `12345678-…-56789abcdef2`      | Write  |
//! | Session token    | `12345678-…-56789abcdef3`      | Write  |
//! | Status           | `12345678-…-56789abcdef4`      | Notify |

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::ports::{PeerEvent, ProvisioningError, ProvisioningPort};

#[cfg(target_os = "espidf")]
use crate::app::ports::ProvisioningField;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x12345678_1234_5678_1234_56789abcdef0;
pub const CHAR_NETWORK_ID: u128 = 0x12345678_1234_5678_1234_56789abcdef1;
pub const CHAR_NETWORK_SECRET: u128 = 0x12345678_1234_5678_1234_56789abcdef2;
pub const CHAR_SESSION_TOKEN: u128 = 0x12345678_1234_5678_1234_56789abcdef3;
pub const CHAR_STATUS: u128 = 0x12345678_1234_5678_1234_56789abcdef4;

/// Advertising interval in 0.625 ms units (500 ms).
#[cfg(target_os = "espidf")]
const ADV_INTERVAL: u16 = 0x320;

/// Longest status payload sent in a single notification.
const MAX_STATUS_BYTES: usize = 64;

const EVENT_DEPTH: usize = 16;

pub type PeerEventChannel = Channel<CriticalSectionRawMutex, PeerEvent, EVENT_DEPTH>;

/// Peer events posted by the Bluedroid GATTS callback.
pub static GATT_EVENTS: PeerEventChannel = Channel::new();

// ───────────────────────────────────────────────────────────────
// Advertising payloads
// ───────────────────────────────────────────────────────────────

/// Legacy advertising and scan response payloads are 31 bytes each.
pub const ADV_PAYLOAD_MAX: usize = 31;

const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_COMPLETE_UUID128: u8 = 0x07;
const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
/// LE general discoverable, BR/EDR not supported.
const AD_FLAGS: u8 = 0x06;

pub type AdvPayload = heapless::Vec<u8, ADV_PAYLOAD_MAX>;

/// Advertising data: flags plus the provisioning service UUID, so
/// scanners filtering on the service find the device.
pub fn advertising_data() -> AdvPayload {
    let mut data = AdvPayload::new();
    let _ = data.extend_from_slice(&[2, AD_TYPE_FLAGS, AD_FLAGS]);
    let _ = data.extend_from_slice(&[17, AD_TYPE_COMPLETE_UUID128]);
    let _ = data.extend_from_slice(&SERVICE_UUID.to_le_bytes());
    data
}

/// Scan response carrying the device name, shortened at a char boundary
/// if it does not fit.
pub fn scan_response(name: &str) -> AdvPayload {
    let room = ADV_PAYLOAD_MAX - 2;
    let (name, ad_type) = if name.len() <= room {
        (name, AD_TYPE_COMPLETE_NAME)
    } else {
        let mut end = room;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        (&name[..end], AD_TYPE_SHORT_NAME)
    };
    let mut data = AdvPayload::new();
    let _ = data.extend_from_slice(&[(name.len() + 1) as u8, ad_type]);
    let _ = data.extend_from_slice(name.as_bytes());
    data
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
    Failed,
}

// ── ESP-IDF BLE static state ──────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_PEER_CONNECTED: AtomicBool = AtomicBool::new(false);
/// Peer Bluetooth address, little-endian in the low 48 bits.
#[cfg(target_os = "espidf")]
static BLE_PEER_ADDR: AtomicU64 = AtomicU64::new(0);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_ID_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SECRET_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_TOKEN_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_STATUS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);
/// Raw payloads (advertising data, scan response) still being applied.
#[cfg(target_os = "espidf")]
static BLE_ADV_PENDING: AtomicU32 = AtomicU32::new(0);

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
    use esp_idf_svc::sys::*;
    let mut char_uuid = uuid128_to_esp(uuid);
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising_raw() {
    use esp_idf_svc::sys::*;
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: ADV_INTERVAL,
            adv_int_max: ADV_INTERVAL,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

#[cfg(target_os = "espidf")]
fn field_for_handle(handle: u32) -> Option<ProvisioningField> {
    if handle == BLE_ID_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
        Some(ProvisioningField::NetworkId)
    } else if handle == BLE_SECRET_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
        Some(ProvisioningField::NetworkSecret)
    } else if handle == BLE_TOKEN_CHAR_HANDLE.load(AtomicOrdering::Relaxed) {
        Some(ProvisioningField::SessionToken)
    } else {
        None
    }
}

#[cfg(target_os = "espidf")]
fn post_event(event: PeerEvent) {
    if GATT_EVENTS.try_send(event).is_err() {
        log::warn!("BLE GATTS: event channel full, dropping event");
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT
        | esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RSP_DATA_RAW_SET_COMPLETE_EVT => {
            // Start once both payloads are in place.
            if BLE_ADV_PENDING.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
                unsafe { start_advertising_raw() };
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        },
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => unsafe {
            BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            esp_ble_gatts_create_service(gatts_if, &mut svc_id, 12);
        },
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => unsafe {
            let svc_handle = (*param).create.service_handle;
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            esp_ble_gatts_start_service(svc_handle);
            BLE_CHAR_STEP.store(1, AtomicOrdering::Relaxed);
            add_gatt_char(
                svc_handle,
                CHAR_NETWORK_ID,
                ESP_GATT_PERM_WRITE,
                ESP_GATT_CHAR_PROP_BIT_WRITE,
            );
        },
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => unsafe {
            let handle = (*param).add_char.attr_handle as u32;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            match BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) {
                1 => {
                    BLE_ID_CHAR_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(2, AtomicOrdering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        CHAR_NETWORK_SECRET,
                        ESP_GATT_PERM_WRITE,
                        ESP_GATT_CHAR_PROP_BIT_WRITE,
                    );
                }
                2 => {
                    BLE_SECRET_CHAR_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(3, AtomicOrdering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        CHAR_SESSION_TOKEN,
                        ESP_GATT_PERM_WRITE,
                        ESP_GATT_CHAR_PROP_BIT_WRITE,
                    );
                }
                3 => {
                    BLE_TOKEN_CHAR_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(4, AtomicOrdering::Relaxed);
                    add_gatt_char(
                        svc_handle,
                        CHAR_STATUS,
                        ESP_GATT_PERM_READ,
                        ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                    );
                }
                4 => {
                    BLE_STATUS_CHAR_HANDLE.store(handle, AtomicOrdering::Relaxed);
                    BLE_CHAR_STEP.store(5, AtomicOrdering::Relaxed);
                    log::info!("BLE GATTS: all characteristics registered");
                }
                _ => {}
            }
        },
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => unsafe {
            let p = &(*param).connect;
            let mut addr = [0u8; 8];
            addr[..6].copy_from_slice(&p.remote_bda);
            BLE_PEER_ADDR.store(u64::from_le_bytes(addr), AtomicOrdering::Relaxed);
            BLE_CONN_ID.store(p.conn_id as u32, AtomicOrdering::Relaxed);
            BLE_PEER_CONNECTED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
            post_event(PeerEvent::Connected);
        },
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            BLE_PEER_CONNECTED.store(false, AtomicOrdering::Release);
            log::info!("BLE GATTS: client disconnected");
            post_event(PeerEvent::Disconnected);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => unsafe {
            let p = &(*param).write;
            if p.need_rsp {
                esp_ble_gatts_send_response(
                    gatts_if,
                    p.conn_id,
                    p.trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    core::ptr::null_mut(),
                );
            }
            let Some(field) = field_for_handle(p.handle as u32) else {
                return;
            };
            let data = if p.value.is_null() {
                Vec::new()
            } else {
                core::slice::from_raw_parts(p.value, p.len as usize).to_vec()
            };
            post_event(PeerEvent::Write { field, data });
        },
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleAdapter {
    state: BleState,
    events: &'static PeerEventChannel,
    #[cfg(target_os = "espidf")]
    stack_up: bool,
    /// Simulation: names passed to `start_advertising`.
    #[cfg(not(target_os = "espidf"))]
    sim_advertised: Vec<String>,
    /// Simulation: payloads passed to `notify`.
    #[cfg(not(target_os = "espidf"))]
    sim_notified: Vec<Vec<u8>>,
    /// Simulation: peer events delivered once advertising starts.
    #[cfg(not(target_os = "espidf"))]
    sim_peer_script: Vec<PeerEvent>,
    /// Simulation: make the next `start_advertising` fail.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_start: bool,
}

impl BleAdapter {
    /// Adapter fed by the Bluedroid callback channel [`GATT_EVENTS`].
    pub fn new() -> Self {
        Self::with_channel(&GATT_EVENTS)
    }

    /// Adapter fed by a caller-provided channel (tests).
    pub fn with_channel(events: &'static PeerEventChannel) -> Self {
        Self {
            state: BleState::Idle,
            events,
            #[cfg(target_os = "espidf")]
            stack_up: false,
            #[cfg(not(target_os = "espidf"))]
            sim_advertised: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_notified: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_peer_script: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_fail_start: false,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    pub fn is_advertising(&self) -> bool {
        matches!(self.state, BleState::Advertising | BleState::Connected)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_advertised(&self) -> &[String] {
        &self.sim_advertised
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_notified(&self) -> &[Vec<u8>] {
        &self.sim_notified
    }

    /// Queue peer behaviour for the next advertising period.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_script_peer(&mut self, events: impl IntoIterator<Item = PeerEvent>) {
        self.sim_peer_script.extend(events);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_start(&mut self, fail: bool) {
        self.sim_fail_start = fail;
    }

    fn drain_stale_events(&self) {
        while self.events.try_receive().is_ok() {}
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_init_stack(&mut self) -> Result<(), ProvisioningError> {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK as i32 {
                log::error!("BLE: bt_controller_init failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK as i32 {
                log::error!("BLE: bt_controller_enable failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }
            let ret = esp_bluedroid_init();
            if ret != ESP_OK as i32 {
                log::error!("BLE: bluedroid_init failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }
            let ret = esp_bluedroid_enable();
            if ret != ESP_OK as i32 {
                log::error!("BLE: bluedroid_enable failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);

            // Just-works pairing, no bonding: credentials are written once.
            let auth_req = esp_ble_auth_req_t_ESP_LE_AUTH_REQ_SC_ONLY;
            let iocap = esp_ble_io_cap_t_ESP_IO_CAP_NONE;
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_AUTHEN_REQ_MODE,
                &auth_req as *const _ as *mut _,
                core::mem::size_of_val(&auth_req) as u32,
            );
            esp_ble_gap_set_security_param(
                esp_ble_sm_param_t_ESP_BLE_SM_IOCAP_MODE,
                &iocap as *const _ as *mut _,
                core::mem::size_of_val(&iocap) as u32,
            );
        }
        info!("BLE(espidf): Bluedroid stack initialized");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, name: &str) -> Result<(), ProvisioningError> {
        use esp_idf_svc::sys::*;

        if !self.stack_up {
            if let Err(e) = self.platform_init_stack() {
                self.state = BleState::Failed;
                return Err(e);
            }
            self.stack_up = true;
        }

        let c_name = std::ffi::CString::new(name).map_err(|_| ProvisioningError::InvalidValue)?;
        let mut adv = advertising_data();
        let mut rsp = scan_response(name);
        BLE_ADV_PENDING.store(2, AtomicOrdering::Release);
        unsafe {
            esp_ble_gap_set_device_name(c_name.as_ptr());
            // Advertising starts from the GAP handler once both are set.
            let ret = esp_ble_gap_config_adv_data_raw(adv.as_mut_ptr(), adv.len() as u32);
            if ret != ESP_OK as i32 {
                warn!("BLE(espidf): config_adv_data_raw failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }
            let ret = esp_ble_gap_config_scan_rsp_data_raw(rsp.as_mut_ptr(), rsp.len() as u32);
            if ret != ESP_OK as i32 {
                warn!("BLE(espidf): config_scan_rsp_data_raw failed ({})", ret);
                return Err(ProvisioningError::StackInitFailed);
            }
        }
        info!("BLE(espidf): advertising as '{}'", name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, name: &str) -> Result<(), ProvisioningError> {
        if self.sim_fail_start {
            warn!("BLE(sim): stack start failed");
            self.state = BleState::Failed;
            return Err(ProvisioningError::StackInitFailed);
        }
        self.sim_advertised.push(name.into());
        for event in self.sim_peer_script.drain(..) {
            if self.events.try_send(event).is_err() {
                warn!("BLE(sim): peer script exceeds channel depth");
                break;
            }
        }
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            if BLE_PEER_CONNECTED.load(AtomicOrdering::Acquire) {
                let packed = BLE_PEER_ADDR.load(AtomicOrdering::Relaxed).to_le_bytes();
                let mut bda = [0u8; 6];
                bda.copy_from_slice(&packed[..6]);
                esp_ble_gap_disconnect(bda.as_mut_ptr());
            }
        }
        info!("BLE(espidf): advertising stopped, peer released");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) {
        info!("BLE(sim): stopped");
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, payload: &[u8]) -> Result<(), ProvisioningError> {
        use esp_idf_svc::sys::*;
        let handle = BLE_STATUS_CHAR_HANDLE.load(AtomicOrdering::Relaxed);
        if handle == 0 || !BLE_PEER_CONNECTED.load(AtomicOrdering::Acquire) {
            return Err(ProvisioningError::NotifyFailed);
        }
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as esp_gatt_if_t,
                BLE_CONN_ID.load(AtomicOrdering::Relaxed) as u16,
                handle as u16,
                payload.len() as u16,
                payload.as_ptr() as *mut u8,
                false,
            )
        };
        if ret != ESP_OK as i32 {
            warn!("BLE(espidf): send_indicate failed ({})", ret);
            return Err(ProvisioningError::NotifyFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, payload: &[u8]) -> Result<(), ProvisioningError> {
        self.sim_notified.push(payload.to_vec());
        info!(
            "BLE(sim): notified '{}'",
            core::str::from_utf8(payload).unwrap_or("<binary>")
        );
        Ok(())
    }
}

impl Default for BleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl Drop for BleAdapter {
    fn drop(&mut self) {
        if !self.stack_up {
            return;
        }
        use esp_idf_svc::sys::*;
        unsafe {
            esp_ble_gap_stop_advertising();
            esp_bluedroid_disable();
            esp_bluedroid_deinit();
            esp_bt_controller_disable();
            esp_bt_controller_deinit();
        }
        info!("BLE(espidf): stack shut down");
    }
}

// ───────────────────────────────────────────────────────────────
// ProvisioningPort implementation
// ───────────────────────────────────────────────────────────────

impl ProvisioningPort for BleAdapter {
    fn start_advertising(&mut self, name: &str) -> Result<(), ProvisioningError> {
        // Events from an earlier advertising period belong to a gone peer.
        self.drain_stale_events();
        self.platform_start(name)?;
        self.state = BleState::Advertising;
        Ok(())
    }

    fn stop(&mut self) {
        if self.state == BleState::Idle {
            return;
        }
        self.platform_stop();
        self.state = BleState::Idle;
    }

    async fn next_event(&mut self) -> PeerEvent {
        let event = self.events.receive().await;
        match event {
            PeerEvent::Connected => self.state = BleState::Connected,
            PeerEvent::Disconnected if self.state == BleState::Connected => {
                self.state = BleState::Advertising;
            }
            _ => {}
        }
        event
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), ProvisioningError> {
        if self.state != BleState::Connected {
            return Err(ProvisioningError::NotifyFailed);
        }
        if payload.len() > MAX_STATUS_BYTES {
            return Err(ProvisioningError::DataTooLong);
        }
        self.platform_notify(payload)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
