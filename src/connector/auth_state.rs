//! File-backed wa-rs storage: the four store traits implemented over one
//! JSON file per namespace inside the session's temp directory, with the
//! device snapshot itself living in `creds.json`. Everything a session
//! produced is reclaimed by deleting that one directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use prost::Message;
use wa_rs_binary::jid::Jid;
use wa_rs_core::appstate::hash::HashState;
use wa_rs_core::appstate::processor::AppStateMutationMAC;
use wa_rs_core::store::error::StoreError;
use wa_rs_core::store::traits::DeviceInfo;
use wa_rs_core::store::traits::DeviceStore as DeviceStoreTrait;
use wa_rs_core::store::traits::*;
use wa_rs_core::store::Device as CoreDevice;

const CREDS_FILE: &str = "creds.json";
const IDENTITIES_FILE: &str = "identities.json";
const SESSIONS_FILE: &str = "signal-sessions.json";
const PREKEYS_FILE: &str = "prekeys.json";
const SIGNED_PREKEYS_FILE: &str = "signed-prekeys.json";
const SENDER_KEYS_FILE: &str = "sender-keys.json";
const APP_STATE_KEYS_FILE: &str = "app-state-keys.json";
const APP_STATE_VERSIONS_FILE: &str = "app-state-versions.json";
const MUTATION_MACS_FILE: &str = "mutation-macs.json";
const LID_MAPPINGS_FILE: &str = "lid-mappings.json";
const SKDM_FILE: &str = "skdm-recipients.json";
const DEVICE_REGISTRY_FILE: &str = "device-registry.json";
const BASE_KEYS_FILE: &str = "base-keys.json";
const FORGET_MARKS_FILE: &str = "forget-marks.json";
const TC_TOKENS_FILE: &str = "tc-tokens.json";

fn store_err<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(e.to_string())
}

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn unb64(s: &str) -> wa_rs_core::store::error::Result<Vec<u8>> {
    STANDARD.decode(s).map_err(store_err)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPreKey {
    key: String,
    uploaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLidMapping {
    lid: String,
    phone_number: String,
    created_at: i64,
    learning_source: String,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDeviceList {
    devices: serde_json::Value,
    timestamp: i64,
    phash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTcToken {
    token: String,
    token_timestamp: i64,
    sender_timestamp: Option<i64>,
}

/// Serde mirror of the device snapshot; key material is base64 of the
/// 64-byte private+public concatenation, matching how the snapshot is
/// reconstructed in `load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDevice {
    lid: Option<String>,
    pn: Option<String>,
    registration_id: u32,
    noise_key: String,
    identity_key: String,
    signed_pre_key: String,
    signed_pre_key_id: u32,
    signed_pre_key_signature: String,
    adv_secret_key: String,
    account: Option<String>,
    push_name: String,
    app_version_primary: u32,
    app_version_secondary: u32,
    app_version_tertiary: u32,
    app_version_last_fetched_ms: i64,
    edge_routing_info: Option<String>,
    props_hash: Option<String>,
}

#[derive(Default)]
struct AuthState {
    device: Option<StoredDevice>,
    identities: HashMap<String, String>,
    sessions: HashMap<String, String>,
    prekeys: HashMap<u32, StoredPreKey>,
    signed_prekeys: HashMap<u32, String>,
    sender_keys: HashMap<String, String>,
    app_state_keys: HashMap<String, serde_json::Value>,
    app_state_versions: HashMap<String, serde_json::Value>,
    /// name -> base64(index_mac) -> base64(value_mac)
    mutation_macs: HashMap<String, HashMap<String, String>>,
    lid_mappings: HashMap<String, StoredLidMapping>,
    skdm_recipients: HashMap<String, Vec<String>>,
    device_registry: HashMap<String, StoredDeviceList>,
    /// "address|message_id" -> base64(base_key)
    base_keys: HashMap<String, String>,
    forget_marks: HashMap<String, Vec<String>>,
    tc_tokens: HashMap<String, StoredTcToken>,
}

/// Multi-file auth state under one directory. All reads are served from
/// memory; every mutation rewrites the one namespace file it touched.
pub struct FileAuthStore {
    dir: PathBuf,
    state: Mutex<AuthState>,
}

impl FileAuthStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let state = AuthState {
            device: load_file(&dir, CREDS_FILE)?,
            identities: load_file(&dir, IDENTITIES_FILE)?.unwrap_or_default(),
            sessions: load_file(&dir, SESSIONS_FILE)?.unwrap_or_default(),
            prekeys: load_file(&dir, PREKEYS_FILE)?.unwrap_or_default(),
            signed_prekeys: load_file(&dir, SIGNED_PREKEYS_FILE)?.unwrap_or_default(),
            sender_keys: load_file(&dir, SENDER_KEYS_FILE)?.unwrap_or_default(),
            app_state_keys: load_file(&dir, APP_STATE_KEYS_FILE)?.unwrap_or_default(),
            app_state_versions: load_file(&dir, APP_STATE_VERSIONS_FILE)?.unwrap_or_default(),
            mutation_macs: load_file(&dir, MUTATION_MACS_FILE)?.unwrap_or_default(),
            lid_mappings: load_file(&dir, LID_MAPPINGS_FILE)?.unwrap_or_default(),
            skdm_recipients: load_file(&dir, SKDM_FILE)?.unwrap_or_default(),
            device_registry: load_file(&dir, DEVICE_REGISTRY_FILE)?.unwrap_or_default(),
            base_keys: load_file(&dir, BASE_KEYS_FILE)?.unwrap_or_default(),
            forget_marks: load_file(&dir, FORGET_MARKS_FILE)?.unwrap_or_default(),
            tc_tokens: load_file(&dir, TC_TOKENS_FILE)?.unwrap_or_default(),
        };

        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    fn persist<T: Serialize>(&self, file: &str, value: &T) -> wa_rs_core::store::error::Result<()> {
        let data = serde_json::to_vec_pretty(value).map_err(store_err)?;
        std::fs::write(self.dir.join(file), data).map_err(store_err)
    }
}

fn load_file<T: DeserializeOwned>(dir: &Path, file: &str) -> anyhow::Result<Option<T>> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&data)?))
}

fn base_key_id(address: &str, message_id: &str) -> String {
    format!("{address}|{message_id}")
}

#[async_trait::async_trait]
impl SignalStore for FileAuthStore {
    // --- Identity Operations ---

    async fn put_identity(
        &self,
        address: &str,
        key: [u8; 32],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.identities.insert(address.to_string(), b64(&key));
        self.persist(IDENTITIES_FILE, &state.identities)
    }

    async fn load_identity(
        &self,
        address: &str,
    ) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .identities
            .get(address)
            .map(|encoded| unb64(encoded))
            .transpose()
    }

    async fn delete_identity(&self, address: &str) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.identities.remove(address);
        self.persist(IDENTITIES_FILE, &state.identities)
    }

    // --- Session Operations ---

    async fn get_session(
        &self,
        address: &str,
    ) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .sessions
            .get(address)
            .map(|encoded| unb64(encoded))
            .transpose()
    }

    async fn put_session(
        &self,
        address: &str,
        session: &[u8],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.sessions.insert(address.to_string(), b64(session));
        self.persist(SESSIONS_FILE, &state.sessions)
    }

    async fn delete_session(&self, address: &str) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.sessions.remove(address);
        self.persist(SESSIONS_FILE, &state.sessions)
    }

    // --- PreKey Operations ---

    async fn store_prekey(
        &self,
        id: u32,
        record: &[u8],
        uploaded: bool,
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.prekeys.insert(
            id,
            StoredPreKey {
                key: b64(record),
                uploaded,
            },
        );
        self.persist(PREKEYS_FILE, &state.prekeys)
    }

    async fn load_prekey(&self, id: u32) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .prekeys
            .get(&id)
            .map(|stored| unb64(&stored.key))
            .transpose()
    }

    async fn remove_prekey(&self, id: u32) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.prekeys.remove(&id);
        self.persist(PREKEYS_FILE, &state.prekeys)
    }

    // --- Signed PreKey Operations ---

    async fn store_signed_prekey(
        &self,
        id: u32,
        record: &[u8],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.signed_prekeys.insert(id, b64(record));
        self.persist(SIGNED_PREKEYS_FILE, &state.signed_prekeys)
    }

    async fn load_signed_prekey(
        &self,
        id: u32,
    ) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .signed_prekeys
            .get(&id)
            .map(|encoded| unb64(encoded))
            .transpose()
    }

    async fn load_all_signed_prekeys(
        &self,
    ) -> wa_rs_core::store::error::Result<Vec<(u32, Vec<u8>)>> {
        let state = self.state.lock();
        let mut result = Vec::with_capacity(state.signed_prekeys.len());
        for (id, encoded) in &state.signed_prekeys {
            result.push((*id, unb64(encoded)?));
        }
        Ok(result)
    }

    async fn remove_signed_prekey(&self, id: u32) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.signed_prekeys.remove(&id);
        self.persist(SIGNED_PREKEYS_FILE, &state.signed_prekeys)
    }

    // --- Sender Key Operations ---

    async fn put_sender_key(
        &self,
        address: &str,
        record: &[u8],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.sender_keys.insert(address.to_string(), b64(record));
        self.persist(SENDER_KEYS_FILE, &state.sender_keys)
    }

    async fn get_sender_key(
        &self,
        address: &str,
    ) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .sender_keys
            .get(address)
            .map(|encoded| unb64(encoded))
            .transpose()
    }

    async fn delete_sender_key(&self, address: &str) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.sender_keys.remove(address);
        self.persist(SENDER_KEYS_FILE, &state.sender_keys)
    }
}

#[async_trait::async_trait]
impl AppSyncStore for FileAuthStore {
    async fn get_sync_key(
        &self,
        key_id: &[u8],
    ) -> wa_rs_core::store::error::Result<Option<AppStateSyncKey>> {
        let state = self.state.lock();
        state
            .app_state_keys
            .get(&b64(key_id))
            .map(|value| serde_json::from_value(value.clone()).map_err(store_err))
            .transpose()
    }

    async fn set_sync_key(
        &self,
        key_id: &[u8],
        key: AppStateSyncKey,
    ) -> wa_rs_core::store::error::Result<()> {
        let value = serde_json::to_value(&key).map_err(store_err)?;
        let mut state = self.state.lock();
        state.app_state_keys.insert(b64(key_id), value);
        self.persist(APP_STATE_KEYS_FILE, &state.app_state_keys)
    }

    async fn get_version(&self, name: &str) -> wa_rs_core::store::error::Result<HashState> {
        let state = self.state.lock();
        let value = state
            .app_state_versions
            .get(name)
            .ok_or_else(|| store_err(format!("no app state version for {name}")))?;
        serde_json::from_value(value.clone()).map_err(store_err)
    }

    async fn set_version(
        &self,
        name: &str,
        state_value: HashState,
    ) -> wa_rs_core::store::error::Result<()> {
        let value = serde_json::to_value(&state_value).map_err(store_err)?;
        let mut state = self.state.lock();
        state.app_state_versions.insert(name.to_string(), value);
        self.persist(APP_STATE_VERSIONS_FILE, &state.app_state_versions)
    }

    async fn put_mutation_macs(
        &self,
        name: &str,
        _version: u64,
        mutations: &[AppStateMutationMAC],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        let entry = state.mutation_macs.entry(name.to_string()).or_default();
        for mutation in mutations {
            entry.insert(b64(&mutation.index_mac), b64(&mutation.value_mac));
        }
        self.persist(MUTATION_MACS_FILE, &state.mutation_macs)
    }

    async fn get_mutation_mac(
        &self,
        name: &str,
        index_mac: &[u8],
    ) -> wa_rs_core::store::error::Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        state
            .mutation_macs
            .get(name)
            .and_then(|macs| macs.get(&b64(index_mac)))
            .map(|encoded| unb64(encoded))
            .transpose()
    }

    async fn delete_mutation_macs(
        &self,
        name: &str,
        index_macs: &[Vec<u8>],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        if let Some(macs) = state.mutation_macs.get_mut(name) {
            for index_mac in index_macs {
                macs.remove(&b64(index_mac));
            }
        }
        self.persist(MUTATION_MACS_FILE, &state.mutation_macs)
    }
}

#[async_trait::async_trait]
impl ProtocolStore for FileAuthStore {
    // --- SKDM Tracking ---

    async fn get_skdm_recipients(
        &self,
        group_jid: &str,
    ) -> wa_rs_core::store::error::Result<Vec<Jid>> {
        let state = self.state.lock();
        let mut result = Vec::new();
        if let Some(jids) = state.skdm_recipients.get(group_jid) {
            for jid_str in jids {
                if let Ok(jid) = jid_str.parse() {
                    result.push(jid);
                }
            }
        }
        Ok(result)
    }

    async fn add_skdm_recipients(
        &self,
        group_jid: &str,
        device_jids: &[Jid],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .skdm_recipients
            .entry(group_jid.to_string())
            .or_default();
        for device_jid in device_jids {
            let jid_str = device_jid.to_string();
            if !entry.contains(&jid_str) {
                entry.push(jid_str);
            }
        }
        self.persist(SKDM_FILE, &state.skdm_recipients)
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.skdm_recipients.remove(group_jid);
        self.persist(SKDM_FILE, &state.skdm_recipients)
    }

    // --- LID-PN Mapping ---

    async fn get_lid_mapping(
        &self,
        lid: &str,
    ) -> wa_rs_core::store::error::Result<Option<LidPnMappingEntry>> {
        let state = self.state.lock();
        Ok(state.lid_mappings.get(lid).map(|stored| LidPnMappingEntry {
            lid: stored.lid.clone(),
            phone_number: stored.phone_number.clone(),
            created_at: stored.created_at,
            learning_source: stored.learning_source.clone(),
            updated_at: stored.updated_at,
        }))
    }

    async fn get_pn_mapping(
        &self,
        phone: &str,
    ) -> wa_rs_core::store::error::Result<Option<LidPnMappingEntry>> {
        let state = self.state.lock();
        // Most recently updated mapping wins, as with the indexed lookup.
        Ok(state
            .lid_mappings
            .values()
            .filter(|stored| stored.phone_number == phone)
            .max_by_key(|stored| stored.updated_at)
            .map(|stored| LidPnMappingEntry {
                lid: stored.lid.clone(),
                phone_number: stored.phone_number.clone(),
                created_at: stored.created_at,
                learning_source: stored.learning_source.clone(),
                updated_at: stored.updated_at,
            }))
    }

    async fn put_lid_mapping(
        &self,
        entry: &LidPnMappingEntry,
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.lid_mappings.insert(
            entry.lid.clone(),
            StoredLidMapping {
                lid: entry.lid.clone(),
                phone_number: entry.phone_number.clone(),
                created_at: entry.created_at,
                learning_source: entry.learning_source.clone(),
                updated_at: entry.updated_at,
            },
        );
        self.persist(LID_MAPPINGS_FILE, &state.lid_mappings)
    }

    async fn get_all_lid_mappings(
        &self,
    ) -> wa_rs_core::store::error::Result<Vec<LidPnMappingEntry>> {
        let state = self.state.lock();
        Ok(state
            .lid_mappings
            .values()
            .map(|stored| LidPnMappingEntry {
                lid: stored.lid.clone(),
                phone_number: stored.phone_number.clone(),
                created_at: stored.created_at,
                learning_source: stored.learning_source.clone(),
                updated_at: stored.updated_at,
            })
            .collect())
    }

    // --- Base Key Collision Detection ---

    async fn save_base_key(
        &self,
        address: &str,
        message_id: &str,
        base_key: &[u8],
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state
            .base_keys
            .insert(base_key_id(address, message_id), b64(base_key));
        self.persist(BASE_KEYS_FILE, &state.base_keys)
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> wa_rs_core::store::error::Result<bool> {
        let state = self.state.lock();
        match state.base_keys.get(&base_key_id(address, message_id)) {
            Some(encoded) => Ok(unb64(encoded)? == current_base_key),
            None => Ok(false),
        }
    }

    async fn delete_base_key(
        &self,
        address: &str,
        message_id: &str,
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.base_keys.remove(&base_key_id(address, message_id));
        self.persist(BASE_KEYS_FILE, &state.base_keys)
    }

    // --- Device Registry ---

    async fn update_device_list(
        &self,
        record: DeviceListRecord,
    ) -> wa_rs_core::store::error::Result<()> {
        let devices = serde_json::to_value(&record.devices).map_err(store_err)?;
        let mut state = self.state.lock();
        state.device_registry.insert(
            record.user.clone(),
            StoredDeviceList {
                devices,
                timestamp: record.timestamp,
                phash: record.phash.clone(),
            },
        );
        self.persist(DEVICE_REGISTRY_FILE, &state.device_registry)
    }

    async fn get_devices(
        &self,
        user: &str,
    ) -> wa_rs_core::store::error::Result<Option<DeviceListRecord>> {
        let state = self.state.lock();
        state
            .device_registry
            .get(user)
            .map(|stored| {
                let devices: Vec<DeviceInfo> =
                    serde_json::from_value(stored.devices.clone()).map_err(store_err)?;
                Ok(DeviceListRecord {
                    user: user.to_string(),
                    devices,
                    timestamp: stored.timestamp,
                    phash: stored.phash.clone(),
                })
            })
            .transpose()
    }

    // --- Sender Key Status (Lazy Deletion) ---

    async fn mark_forget_sender_key(
        &self,
        group_jid: &str,
        participant: &str,
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        let entry = state
            .forget_marks
            .entry(group_jid.to_string())
            .or_default();
        let participant = participant.to_string();
        if !entry.contains(&participant) {
            entry.push(participant);
        }
        self.persist(FORGET_MARKS_FILE, &state.forget_marks)
    }

    async fn consume_forget_marks(
        &self,
        group_jid: &str,
    ) -> wa_rs_core::store::error::Result<Vec<String>> {
        let mut state = self.state.lock();
        let marks = state.forget_marks.remove(group_jid).unwrap_or_default();
        self.persist(FORGET_MARKS_FILE, &state.forget_marks)?;
        Ok(marks)
    }

    // --- TcToken Storage ---

    async fn get_tc_token(
        &self,
        jid: &str,
    ) -> wa_rs_core::store::error::Result<Option<TcTokenEntry>> {
        let state = self.state.lock();
        state
            .tc_tokens
            .get(jid)
            .map(|stored| {
                Ok(TcTokenEntry {
                    token: unb64(&stored.token)?,
                    token_timestamp: stored.token_timestamp,
                    sender_timestamp: stored.sender_timestamp,
                })
            })
            .transpose()
    }

    async fn put_tc_token(
        &self,
        jid: &str,
        entry: &TcTokenEntry,
    ) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.tc_tokens.insert(
            jid.to_string(),
            StoredTcToken {
                token: b64(&entry.token),
                token_timestamp: entry.token_timestamp,
                sender_timestamp: entry.sender_timestamp,
            },
        );
        self.persist(TC_TOKENS_FILE, &state.tc_tokens)
    }

    async fn delete_tc_token(&self, jid: &str) -> wa_rs_core::store::error::Result<()> {
        let mut state = self.state.lock();
        state.tc_tokens.remove(jid);
        self.persist(TC_TOKENS_FILE, &state.tc_tokens)
    }

    async fn get_all_tc_token_jids(&self) -> wa_rs_core::store::error::Result<Vec<String>> {
        let state = self.state.lock();
        Ok(state.tc_tokens.keys().cloned().collect())
    }

    async fn delete_expired_tc_tokens(
        &self,
        cutoff_timestamp: i64,
    ) -> wa_rs_core::store::error::Result<u32> {
        let mut state = self.state.lock();
        let before = state.tc_tokens.len();
        state
            .tc_tokens
            .retain(|_, stored| stored.token_timestamp >= cutoff_timestamp);
        let deleted = before - state.tc_tokens.len();
        self.persist(TC_TOKENS_FILE, &state.tc_tokens)?;

        u32::try_from(deleted)
            .map_err(|_| store_err(format!("deleted row count overflowed u32: {deleted}")))
    }
}

#[async_trait::async_trait]
impl DeviceStoreTrait for FileAuthStore {
    async fn save(&self, device: &CoreDevice) -> wa_rs_core::store::error::Result<()> {
        // Key pairs persist as private||public (32+32 bytes).
        let noise_key = {
            let mut bytes = Vec::new();
            let priv_key = device.noise_key.private_key.serialize();
            bytes.extend_from_slice(priv_key.as_slice());
            bytes.extend_from_slice(device.noise_key.public_key.public_key_bytes());
            bytes
        };

        let identity_key = {
            let mut bytes = Vec::new();
            let priv_key = device.identity_key.private_key.serialize();
            bytes.extend_from_slice(priv_key.as_slice());
            bytes.extend_from_slice(device.identity_key.public_key.public_key_bytes());
            bytes
        };

        let signed_pre_key = {
            let mut bytes = Vec::new();
            let priv_key = device.signed_pre_key.private_key.serialize();
            bytes.extend_from_slice(priv_key.as_slice());
            bytes.extend_from_slice(device.signed_pre_key.public_key.public_key_bytes());
            bytes
        };

        let account = device.account.as_ref().map(|a| a.encode_to_vec());

        let stored = StoredDevice {
            lid: device.lid.as_ref().map(|j| j.to_string()),
            pn: device.pn.as_ref().map(|j| j.to_string()),
            registration_id: device.registration_id,
            noise_key: b64(&noise_key),
            identity_key: b64(&identity_key),
            signed_pre_key: b64(&signed_pre_key),
            signed_pre_key_id: device.signed_pre_key_id,
            signed_pre_key_signature: b64(&device.signed_pre_key_signature),
            adv_secret_key: b64(&device.adv_secret_key),
            account: account.map(|bytes| b64(&bytes)),
            push_name: device.push_name.clone(),
            app_version_primary: device.app_version_primary,
            app_version_secondary: device.app_version_secondary,
            app_version_tertiary: device.app_version_tertiary,
            app_version_last_fetched_ms: device.app_version_last_fetched_ms,
            edge_routing_info: device.edge_routing_info.as_ref().map(|v| b64(v)),
            props_hash: device.props_hash.clone(),
        };

        let mut state = self.state.lock();
        state.device = Some(stored);
        self.persist(CREDS_FILE, &state.device)
    }

    async fn load(&self) -> wa_rs_core::store::error::Result<Option<CoreDevice>> {
        let stored = {
            let state = self.state.lock();
            match &state.device {
                Some(stored) => stored.clone(),
                None => return Ok(None),
            }
        };

        let noise_key_bytes = unb64(&stored.noise_key)?;
        let identity_key_bytes = unb64(&stored.identity_key)?;
        let signed_pre_key_bytes = unb64(&stored.signed_pre_key)?;

        if noise_key_bytes.len() != 64
            || identity_key_bytes.len() != 64
            || signed_pre_key_bytes.len() != 64
        {
            return Err(store_err("key pair is not 64 bytes"));
        }

        use wa_rs_core::libsignal::protocol::{KeyPair, PrivateKey, PublicKey};

        let noise_key = KeyPair::new(
            PublicKey::from_djb_public_key_bytes(&noise_key_bytes[32..64]).map_err(store_err)?,
            PrivateKey::deserialize(&noise_key_bytes[0..32]).map_err(store_err)?,
        );

        let identity_key = KeyPair::new(
            PublicKey::from_djb_public_key_bytes(&identity_key_bytes[32..64])
                .map_err(store_err)?,
            PrivateKey::deserialize(&identity_key_bytes[0..32]).map_err(store_err)?,
        );

        let signed_pre_key = KeyPair::new(
            PublicKey::from_djb_public_key_bytes(&signed_pre_key_bytes[32..64])
                .map_err(store_err)?,
            PrivateKey::deserialize(&signed_pre_key_bytes[0..32]).map_err(store_err)?,
        );

        let signature_bytes = unb64(&stored.signed_pre_key_signature)?;
        let adv_secret_bytes = unb64(&stored.adv_secret_key)?;
        if signature_bytes.len() != 64 || adv_secret_bytes.len() != 32 {
            return Err(store_err("signature or adv secret has unexpected length"));
        }

        let mut signature = [0u8; 64];
        let mut adv_secret = [0u8; 32];
        signature.copy_from_slice(&signature_bytes);
        adv_secret.copy_from_slice(&adv_secret_bytes);

        let account = match &stored.account {
            Some(encoded) => {
                let bytes = unb64(encoded)?;
                Some(
                    wa_rs_proto::whatsapp::AdvSignedDeviceIdentity::decode(&*bytes)
                        .map_err(store_err)?,
                )
            }
            None => None,
        };

        let edge_routing_info = match &stored.edge_routing_info {
            Some(encoded) => Some(unb64(encoded)?),
            None => None,
        };

        Ok(Some(CoreDevice {
            lid: stored.lid.as_deref().and_then(|s| s.parse().ok()),
            pn: stored.pn.as_deref().and_then(|s| s.parse().ok()),
            registration_id: stored.registration_id,
            noise_key,
            identity_key,
            signed_pre_key,
            signed_pre_key_id: stored.signed_pre_key_id,
            signed_pre_key_signature: signature,
            adv_secret_key: adv_secret,
            account,
            push_name: stored.push_name.clone(),
            app_version_primary: stored.app_version_primary,
            app_version_secondary: stored.app_version_secondary,
            app_version_tertiary: stored.app_version_tertiary,
            app_version_last_fetched_ms: stored.app_version_last_fetched_ms,
            edge_routing_info,
            props_hash: stored.props_hash.clone(),
            ..Default::default()
        }))
    }

    async fn exists(&self) -> wa_rs_core::store::error::Result<bool> {
        Ok(self.state.lock().device.is_some())
    }

    async fn create(&self) -> wa_rs_core::store::error::Result<i32> {
        // One device per auth directory.
        Ok(1)
    }

    async fn snapshot_db(
        &self,
        name: &str,
        extra_content: Option<&[u8]>,
    ) -> wa_rs_core::store::error::Result<()> {
        let creds = self.dir.join(CREDS_FILE);
        if creds.exists() {
            let snapshot = self.dir.join(format!("creds.snapshot.{name}.json"));
            std::fs::copy(&creds, &snapshot).map_err(store_err)?;
            if let Some(content) = extra_content {
                std::fs::write(self.dir.join(format!("creds.snapshot.{name}.extra")), content)
                    .map_err(store_err)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lid_mapping_round_trip_preserves_learning_source_and_updated_at() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileAuthStore::new(tmp.path()).unwrap();
        let entry = LidPnMappingEntry {
            lid: "100000012345678".to_string(),
            phone_number: "15551234567".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
            learning_source: "usync".to_string(),
        };

        ProtocolStore::put_lid_mapping(&store, &entry).await.unwrap();

        let loaded = ProtocolStore::get_lid_mapping(&store, &entry.lid)
            .await
            .unwrap()
            .expect("expected lid mapping to be present");
        assert_eq!(loaded.learning_source, entry.learning_source);
        assert_eq!(loaded.updated_at, entry.updated_at);

        let loaded_by_pn = ProtocolStore::get_pn_mapping(&store, &entry.phone_number)
            .await
            .unwrap()
            .expect("expected pn mapping to be present");
        assert_eq!(loaded_by_pn.lid, entry.lid);
    }

    #[tokio::test]
    async fn delete_expired_tc_tokens_returns_deleted_row_count() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileAuthStore::new(tmp.path()).unwrap();

        let expired = TcTokenEntry {
            token: vec![1, 2, 3],
            token_timestamp: 10,
            sender_timestamp: None,
        };
        let fresh = TcTokenEntry {
            token: vec![4, 5, 6],
            token_timestamp: 1000,
            sender_timestamp: Some(1000),
        };

        ProtocolStore::put_tc_token(&store, "15550000001", &expired)
            .await
            .unwrap();
        ProtocolStore::put_tc_token(&store, "15550000002", &fresh)
            .await
            .unwrap();

        let deleted = ProtocolStore::delete_expired_tc_tokens(&store, 100)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(ProtocolStore::get_tc_token(&store, "15550000001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn namespaces_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = FileAuthStore::new(tmp.path()).unwrap();
            SignalStore::put_identity(&store, "addr.1", [7u8; 32])
                .await
                .unwrap();
            SignalStore::store_prekey(&store, 5, b"record", true)
                .await
                .unwrap();
        }

        let reopened = FileAuthStore::new(tmp.path()).unwrap();
        assert_eq!(
            SignalStore::load_identity(&reopened, "addr.1")
                .await
                .unwrap(),
            Some(vec![7u8; 32])
        );
        assert_eq!(
            SignalStore::load_prekey(&reopened, 5).await.unwrap(),
            Some(b"record".to_vec())
        );
        assert!(tmp.path().join(IDENTITIES_FILE).exists());
    }
}
