#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use core::cell::RefCell;
use core::time::Duration;

use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use esp_hal::rtc_cntl::{Rtc, reset_reason, wakeup_cause};
use esp_hal::system::Cpu;
use log::{error, info};

use thermlog_core::board::Indicator;
use thermlog_core::sensors::{BatteryMonitor, ChannelSelector, ThermistorSampler};
use thermlog_core::storage::SdCardStorage;
use thermlog_core::time::{Ds3231, Timebase};
use thermlog_core::{Board, Logger, SleepRequest};
use thermlog_firmware::board_config::{
    BATTERY_FAULT_CODE, THERMISTOR_FAULT_CODE, logger_config,
};
use thermlog_firmware::hardware::{
    FixedTimeSource, RtcRetained, SharedAdcInput, create_i2c_bus, create_sd_spi_bus,
    init_spi_hardware, reset_cause,
};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Enter deep sleep as requested by the controller. Never returns: a timer
/// wake restarts execution at `main`.
fn enter_sleep(rtc: &mut Rtc<'_>, request: SleepRequest) -> ! {
    match request {
        SleepRequest::Timed { seconds } => {
            info!("Deep sleep for {} s", seconds);
            let timer = TimerWakeupSource::new(Duration::from_secs(seconds as u64));
            rtc.sleep_deep(&[&timer])
        }
        SleepRequest::Indefinite => {
            info!("Deep sleep until power is cycled");
            rtc.sleep_deep(&[])
        }
    }
}

#[esp_hal::main]
fn main() -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(size: 32 * 1024);

    let mut rtc = Rtc::new(peripherals.LPWR);
    let cause = reset_cause(reset_reason(Cpu::ProCpu));
    info!("Boot: {:?}, wake source {:?}", cause, wakeup_cause());

    let checked = logger_config().and_then(|config| {
        let channels = config.validate()?;
        Ok((config, channels))
    });
    let (config, channels) = match checked {
        Ok(checked) => checked,
        Err(e) => {
            error!("Board configuration rejected: {}", e);
            enter_sleep(&mut rtc, SleepRequest::Indefinite);
        }
    };

    // Analog front end: mux common and battery divider share ADC1
    let mut adc_config = AdcConfig::new();
    let mux_common = adc_config.enable_pin(peripherals.GPIO1, Attenuation::_11dB);
    let battery_sense = adc_config.enable_pin(peripherals.GPIO2, Attenuation::_11dB);
    let adc = RefCell::new(Adc::new(peripherals.ADC1, adc_config));

    let mux_lines = [
        Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default()),
    ];

    let mut board = Board {
        thermistors: ThermistorSampler::new(
            SharedAdcInput::new(&adc, mux_common, THERMISTOR_FAULT_CODE),
            ChannelSelector::new(mux_lines),
            config.thermistor,
            channels,
            config.timing.settle_ms,
            config.timing.self_heat_ms,
        ),
        battery: BatteryMonitor::new(
            SharedAdcInput::new(&adc, battery_sense, BATTERY_FAULT_CODE),
            config.battery,
        ),
        indicator: Indicator::new(Output::new(
            peripherals.GPIO21,
            Level::Low,
            OutputConfig::default(),
        )),
        start: Input::new(
            peripherals.GPIO7,
            InputConfig::default().with_pull(Pull::Down),
        ),
        delay: Delay::new(),
    };

    let i2c = match create_i2c_bus(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9) {
        Ok(i2c) => i2c,
        Err(e) => {
            error!("I2C init failed: {:?}", e);
            enter_sleep(&mut rtc, SleepRequest::Indefinite);
        }
    };

    let spi_bus = match create_sd_spi_bus(
        peripherals.SPI2,
        peripherals.GPIO12,
        peripherals.GPIO11,
        peripherals.GPIO13,
    ) {
        Ok(spi) => spi,
        Err(e) => {
            error!("SPI init failed: {:?}", e);
            enter_sleep(&mut rtc, SleepRequest::Indefinite);
        }
    };
    let cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let Ok(sd_spi) = ExclusiveDevice::new_no_delay(spi_bus, cs);
    let storage = SdCardStorage::new(init_spi_hardware(sd_spi, Delay::new()), FixedTimeSource);

    let timebase = Timebase::new(
        config.time_mode,
        Ds3231::new(i2c),
        &storage,
        config.log_interval_secs,
    );

    let request = match Logger::new(config, timebase, &storage, RtcRetained::take()) {
        Ok(mut logger) => logger.boot(&mut board, cause),
        Err(e) => {
            error!("Logger not started: {}", e);
            SleepRequest::Indefinite
        }
    };

    enter_sleep(&mut rtc, request)
}
