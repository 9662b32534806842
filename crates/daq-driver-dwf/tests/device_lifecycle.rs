//! Open, release and sharing of device handles.

use std::sync::Arc;
use std::thread;

use daq_driver_dwf::mock::{BMA456_ADDRESS, BMA456_CHIP_ID, LSM6DSO_WHO_AM_I};
use daq_driver_dwf::{
    session_config_from_str, DeviceProfile, DriverCall, DwfDevice, DwfError, I2cConfig,
    MockDriver, OpenOptions, SpiConfig,
};

#[test]
fn every_profile_opens() {
    for raw in 0..=6 {
        let driver = Arc::new(MockDriver::new());
        let profile = DeviceProfile::from_raw(raw).unwrap();
        let device = DwfDevice::open(driver.clone(), profile).unwrap();
        assert_eq!(device.profile(), profile);
        assert_eq!(
            driver.calls(),
            vec![DriverCall::DeviceConfigOpen {
                device_index: -1,
                config: raw
            }]
        );
        device.release().unwrap();
    }
}

#[test]
fn open_failure_is_fatal_and_descriptive() {
    let driver = Arc::new(MockDriver::new());
    let err = DwfDevice::open_with(driver, &OpenOptions::default().device_index(9)).unwrap_err();
    assert_eq!(
        err,
        DwfError::DeviceOpen {
            device: "index 9".to_string(),
            message: "Device not found".to_string(),
        }
    );
}

#[test]
fn open_by_name_enumerates() {
    let driver = Arc::new(MockDriver::new());
    let device = DwfDevice::open_with(
        driver.clone(),
        &OpenOptions::default().device_name("Analog Discovery 2"),
    )
    .unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::EnumerateDevices,
            DriverCall::EnumDeviceName { index: 0 },
            DriverCall::EnumSerialNumber { index: 0 },
            DriverCall::DeviceConfigOpen {
                device_index: 0,
                config: 0
            },
        ]
    );
    device.release().unwrap();
}

#[test]
fn release_is_authoritative() {
    let driver = Arc::new(MockDriver::with_demo_peripherals());
    let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
    let supply = device.acquire_power_supply().unwrap();
    let mut i2c = device.acquire_i2c_bus(true).unwrap();

    device.release().unwrap();
    assert_eq!(driver.open_handle_count(), 0);
    assert_eq!(device.release(), Err(DwfError::DeviceReleased));
    assert!(supply.enable_all_outputs(true).unwrap_err().is_released());
    assert!(i2c
        .configure_bus(I2cConfig::new(BMA456_ADDRESS))
        .unwrap_err()
        .is_released());
}

#[test]
fn dropping_all_clones_closes() {
    let driver = Arc::new(MockDriver::new());
    {
        let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();
        let _clone = device.clone();
        let _spi = device.acquire_spi_bus(true).unwrap();
        assert_eq!(driver.open_handle_count(), 1);
    }
    assert_eq!(driver.open_handle_count(), 0);
}

#[test]
fn buses_on_separate_threads_do_not_interleave() {
    let driver = Arc::new(MockDriver::with_demo_peripherals());
    let device = DwfDevice::open(driver.clone(), DeviceProfile::default()).unwrap();

    let mut spi = device.acquire_spi_bus(true).unwrap();
    spi.configure_bus(SpiConfig::default()).unwrap();
    // I2C on pins clear of the SPI ones.
    let mut i2c = device.acquire_i2c_bus(true).unwrap();
    i2c.configure_bus(I2cConfig::new(BMA456_ADDRESS).with_pins(8, 9))
        .unwrap();
    driver.clear_calls();

    let spi_thread = thread::spawn(move || {
        for _ in 0..50 {
            assert_eq!(spi.write_read(&[0x8F, 0x00], 2).unwrap()[1], LSM6DSO_WHO_AM_I);
        }
    });
    let i2c_thread = thread::spawn(move || {
        for _ in 0..50 {
            assert_eq!(i2c.write_read(&[0x00], 1).unwrap().data, vec![BMA456_CHIP_ID]);
        }
    });
    spi_thread.join().unwrap();
    i2c_thread.join().unwrap();

    // Every SPI transfer sits between its own select/deselect pair.
    let calls = driver.calls();
    for (i, call) in calls.iter().enumerate() {
        if matches!(call, DriverCall::SpiWriteRead { .. }) {
            assert_eq!(calls[i - 1], DriverCall::SpiSelect { pin: 0, level: 0 });
            assert_eq!(calls[i + 1], DriverCall::SpiSelect { pin: 0, level: 1 });
        }
    }
    device.release().unwrap();
}

#[test]
fn session_file_drives_a_full_bring_up() {
    let session = session_config_from_str(
        r#"
        [device]
        profile = "scope8k_wavegen4k_logic2k_patterns256_power"

        [power_supply]
        positive = { voltage = 3.3, current = 0.5 }
        enable_outputs = true

        [spi]
        clock_rate = 1e6

        [i2c]
        address = 0x18
        scl = 8
        sda = 9
        "#,
    )
    .unwrap();

    let driver = Arc::new(MockDriver::with_demo_peripherals());
    let device = DwfDevice::open_with(driver.clone(), &session.device).unwrap();
    assert_eq!(
        device.profile(),
        DeviceProfile::Scope8kWavegen4kLogic2kPatterns256Power
    );

    let mut supply = device.acquire_power_supply().unwrap();
    supply.apply(&session.power_supply).unwrap();
    assert_eq!(supply.read_positive_supply().unwrap().voltage, 3.3);

    let mut spi = device.acquire_spi_bus(true).unwrap();
    spi.configure_bus(session.spi.unwrap()).unwrap();
    assert_eq!(spi.write_read(&[0x8F, 0x00], 2).unwrap(), vec![0x00, LSM6DSO_WHO_AM_I]);

    let mut i2c = device.acquire_i2c_bus(true).unwrap();
    i2c.configure_bus(session.i2c.unwrap()).unwrap();
    assert_eq!(i2c.write_read(&[0x00], 1).unwrap().data, vec![BMA456_CHIP_ID]);

    device.release().unwrap();
}
