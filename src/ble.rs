use async_trait::async_trait;
use btleplug::{
    api::{
        BDAddr, Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
        ScanFilter, ValueNotification, WriteType,
    },
    platform::{Adapter, Manager, Peripheral},
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::{collections::HashMap, pin::Pin, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{MowerError, Result},
    transport::Transport,
    types::{ConnectionParams, DeviceInfo},
    DEVICE_NAME_CHAR_UUID, DEVICE_TYPE_CHAR_UUID, HUSQVARNA_MANUFACTURER_ID, MOWER_NOTIFY_CHAR_UUID,
    MOWER_SERVICE_UUID, MOWER_WRITE_CHAR_UUID,
};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// BLE manager for discovering mowers
pub struct BleManager {
    manager: Manager,
    peripherals: Arc<Mutex<HashMap<BDAddr, Peripheral>>>,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Ble`] if the Bluetooth stack cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        Ok(Self {
            manager,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    async fn central(&self) -> Result<Adapter> {
        self.manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(MowerError::DeviceNotFound)
    }

    /// Scan for devices advertising the Husqvarna manufacturer id
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::DeviceNotFound`] if no Bluetooth adapter is available,
    /// or [`MowerError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_for_mowers(&self, params: &ConnectionParams) -> Result<Vec<DeviceInfo>> {
        let mowers: Vec<DeviceInfo> = self
            .scan_all(params)
            .await?
            .into_iter()
            .filter(|device| device.is_husqvarna)
            .collect();

        info!("Scan completed. Found {} mower(s)", mowers.len());
        Ok(mowers)
    }

    /// Scan for every advertising device
    ///
    /// Mowers do not always include their service UUID in advertisements, so
    /// the scan is unfiltered.
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::DeviceNotFound`] if no Bluetooth adapter is available,
    /// or [`MowerError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_all(&self, params: &ConnectionParams) -> Result<Vec<DeviceInfo>> {
        info!("Scanning for {} ms...", params.scan_timeout_ms);

        let central = self.central().await?;
        central.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;
        central.stop_scan().await?;

        let mut devices = Vec::new();
        let mut cache = self.peripherals.lock().await;
        for peripheral in central.peripherals().await? {
            let properties = peripheral.properties().await.ok().flatten();
            let device_info = device_info(peripheral.address(), properties.as_ref());
            debug!("Found device: {:?}", device_info);

            cache.insert(peripheral.address(), peripheral);
            devices.push(device_info);
        }

        Ok(devices)
    }

    /// Look up a device by Bluetooth address, scanning if it has not been seen yet
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::DeviceNotFound`] if no device with that address
    /// shows up during the scan.
    pub async fn find_by_address(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<DeviceInfo> {
        let peripheral = self.peripheral_by_address(address, params).await?;
        let properties = peripheral.properties().await.ok().flatten();
        Ok(device_info(peripheral.address(), properties.as_ref()))
    }

    /// Create a transport for the device at `address`
    ///
    /// The link is established by [`Transport::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::DeviceNotFound`] if the device cannot be found.
    pub async fn connect_transport(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<BleTransport> {
        let peripheral = self.peripheral_by_address(address, params).await?;
        info!("Using device {}", peripheral.address());
        Ok(BleTransport::new(peripheral, params))
    }

    async fn peripheral_by_address(
        &self,
        address: &str,
        params: &ConnectionParams,
    ) -> Result<Peripheral> {
        if let Some(peripheral) = self.cached(address).await {
            return Ok(peripheral);
        }
        self.scan_all(params).await?;
        self.cached(address).await.ok_or(MowerError::DeviceNotFound)
    }

    async fn cached(&self, address: &str) -> Option<Peripheral> {
        self.peripherals
            .lock()
            .await
            .iter()
            .find(|(addr, _)| matches_address(&addr.to_string(), address))
            .map(|(_, peripheral)| peripheral.clone())
    }
}

/// Case- and separator-insensitive address comparison
fn matches_address(candidate: &str, wanted: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    let wanted = normalize(wanted);
    !wanted.is_empty() && normalize(candidate) == wanted
}

fn device_info(address: BDAddr, properties: Option<&PeripheralProperties>) -> DeviceInfo {
    let mut info = DeviceInfo::new(address.to_string());
    if let Some(properties) = properties {
        info.name.clone_from(&properties.local_name);
        info.rssi = properties.rssi;
        info.is_husqvarna = properties
            .manufacturer_data
            .contains_key(&HUSQVARNA_MANUFACTURER_ID);
    }
    info
}

/// Static GATT information read by [`BleTransport::probe_gatt`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GattInfo {
    /// Brand derived from the advertised manufacturer id
    pub manufacturer: Option<String>,
    /// Device-type string characteristic
    pub device_type: Option<String>,
    /// GAP device name, which carries the model
    pub model: Option<String>,
}

#[derive(Clone)]
struct MowerCharacteristics {
    write: Characteristic,
    notify: Characteristic,
}

/// [`Transport`] over a btleplug peripheral
pub struct BleTransport {
    peripheral: Peripheral,
    mtu: usize,
    connect_timeout: Duration,
    characteristics: Mutex<Option<MowerCharacteristics>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Wrap a discovered peripheral
    #[must_use]
    pub fn new(peripheral: Peripheral, params: &ConnectionParams) -> Self {
        Self {
            peripheral,
            mtu: params.mtu,
            connect_timeout: Duration::from_millis(params.connect_timeout_ms),
            characteristics: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    /// Device address
    #[must_use]
    pub fn address(&self) -> BDAddr {
        self.peripheral.address()
    }

    async fn characteristics(&self) -> Result<MowerCharacteristics> {
        self.characteristics
            .lock()
            .await
            .clone()
            .ok_or(MowerError::Disconnected)
    }

    /// Read manufacturer, device type and model without opening a session
    ///
    /// Connects if needed and leaves the link up.
    ///
    /// # Errors
    ///
    /// Returns connection errors or [`MowerError::Ble`] if a read fails.
    pub async fn probe_gatt(&self) -> Result<GattInfo> {
        if !self.is_connected().await {
            self.connect().await?;
        }

        let mut info = GattInfo::default();

        if let Ok(Some(properties)) = self.peripheral.properties().await {
            if properties
                .manufacturer_data
                .contains_key(&HUSQVARNA_MANUFACTURER_ID)
            {
                info.manufacturer = Some("Husqvarna".to_string());
            }
        }

        for characteristic in self.peripheral.characteristics() {
            let slot = if characteristic.uuid == DEVICE_TYPE_CHAR_UUID {
                &mut info.device_type
            } else if characteristic.uuid == DEVICE_NAME_CHAR_UUID {
                &mut info.model
            } else {
                continue;
            };

            let value = self.peripheral.read(&characteristic).await?;
            *slot = Some(
                String::from_utf8_lossy(&value)
                    .trim_end_matches('\0')
                    .to_string(),
            );
        }

        debug!("GATT probe: {:?}", info);
        Ok(info)
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<()> {
        info!("Connecting to {}", self.peripheral.address());

        // Bonding is negotiated by the OS stack during connect.
        timeout(self.connect_timeout, self.peripheral.connect())
            .await
            .map_err(|_| {
                MowerError::ConnectionFailed(format!(
                    "Connect timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| MowerError::ConnectionFailed(e.to_string()))?;

        self.peripheral.discover_services().await?;

        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == MOWER_SERVICE_UUID)
            .ok_or_else(|| MowerError::ConnectionFailed("Mower service not found".to_string()))?;

        let find = |uuid: Uuid, what: &str| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| MowerError::ConnectionFailed(format!("{what} characteristic not found")))
        };
        let characteristics = MowerCharacteristics {
            write: find(MOWER_WRITE_CHAR_UUID, "Write")?,
            notify: find(MOWER_NOTIFY_CHAR_UUID, "Notify")?,
        };

        *self.characteristics.lock().await = Some(characteristics);
        info!("Connected to {}", self.peripheral.address());
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let characteristics = self.characteristics().await?;

        let stream = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&characteristics.notify).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(handle_notifications(
            stream,
            characteristics.notify.uuid,
            sender,
        ));

        if let Some(previous) = self.pump.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(receiver)
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        let characteristics = self.characteristics().await?;
        self.peripheral
            .write(&characteristics.write, chunk, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn stop_notifications(&self) -> Result<()> {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        let characteristics = self.characteristics.lock().await.clone();
        if let Some(characteristics) = characteristics {
            self.peripheral.unsubscribe(&characteristics.notify).await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.peripheral.address());
        self.characteristics.lock().await.take();
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}

/// Forward notifications of one characteristic into the session channel
async fn handle_notifications(
    mut stream: NotificationStream,
    uuid: Uuid,
    sender: mpsc::UnboundedSender<Bytes>,
) {
    while let Some(notification) = stream.next().await {
        if notification.uuid != uuid {
            continue;
        }
        debug!("Notification: {:02x?}", notification.value);
        if sender.send(Bytes::from(notification.value)).is_err() {
            break;
        }
    }
    warn!("Notification stream ended");
}
