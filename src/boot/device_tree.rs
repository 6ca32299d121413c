//! Device Tree (FDT) generation for direct kernel boot with a LINFlex console

use crate::devices::linflex::regs::LINFLEX_MMIO_SIZE;
use crate::devices::linflex::LinflexConfig;
use std::error::Error;
use vm_fdt::FdtWriter;

/// Linux の linflexuart ドライバが照合する compatible 文字列
pub const LINFLEX_COMPATIBLE: &str = "fsl,s32v234-linflexuart";

/// GIC の phandle
const GIC_PHANDLE: u32 = 1;

/// Device Tree configuration
#[derive(Debug, Clone)]
pub struct DeviceTreeConfig {
    /// Memory base address
    pub memory_base: u64,
    /// Memory size in bytes
    pub memory_size: u64,
    /// GIC Distributor base address
    pub gic_dist_base: u64,
    /// GIC CPU Interface base address
    pub gic_cpu_base: u64,
    /// コンソールにする LINFlex
    pub uart: LinflexConfig,
    /// Kernel command line
    pub cmdline: String,
}

impl Default for DeviceTreeConfig {
    fn default() -> Self {
        Self {
            memory_base: 0x8000_0000,
            memory_size: 0x800_0000, // 128MB
            gic_dist_base: 0x5080_0000,
            gic_cpu_base: 0x5088_0000,
            uart: LinflexConfig::default(),
            cmdline: "console=ttyLF0,115200 earlycon".to_string(),
        }
    }
}

/// LINFlex ノードの名前 (`serial@<base>`)
pub fn serial_node_name(uart: &LinflexConfig) -> String {
    format!("serial@{:x}", uart.base)
}

/// Generate a Device Tree binary
///
/// Creates a minimal Device Tree with:
/// - Memory node
/// - GICv2 interrupt controller node
/// - LINFlex serial node (level-high SPI)
/// - chosen node with bootargs and stdout-path pointing at the serial node
pub fn generate_device_tree(config: &DeviceTreeConfig) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut fdt = FdtWriter::new()?;

    let root_node = fdt.begin_node("")?;
    fdt.property_string("compatible", "linux,dummy-virt")?;
    fdt.property_u32("#address-cells", 2)?;
    fdt.property_u32("#size-cells", 2)?;
    fdt.property_string("model", "linflex-virt")?;
    fdt.property_u32("interrupt-parent", GIC_PHANDLE)?;

    let memory_node = fdt.begin_node(&format!("memory@{:x}", config.memory_base))?;
    fdt.property_string("device_type", "memory")?;
    fdt.property_array_u64("reg", &[config.memory_base, config.memory_size])?;
    fdt.end_node(memory_node)?;

    let gic_node = fdt.begin_node(&format!("intc@{:x}", config.gic_dist_base))?;
    fdt.property_string("compatible", "arm,cortex-a15-gic")?;
    fdt.property_null("interrupt-controller")?;
    fdt.property_u32("#interrupt-cells", 3)?;
    fdt.property_array_u64(
        "reg",
        &[config.gic_dist_base, 0x1_0000, config.gic_cpu_base, 0x1_0000],
    )?;
    fdt.property_u32("phandle", GIC_PHANDLE)?;
    fdt.end_node(gic_node)?;

    // レジスタ空間は 0x3000 と書かれることもあるが、実装しているのは 0x1000 だけ
    let uart_node_name = serial_node_name(&config.uart);
    let uart_node = fdt.begin_node(&uart_node_name)?;
    fdt.property_string("compatible", LINFLEX_COMPATIBLE)?;
    fdt.property_array_u64("reg", &[config.uart.base, LINFLEX_MMIO_SIZE])?;
    // SPI, irq, level-high
    fdt.property_array_u32("interrupts", &[0, config.uart.irq, 0x4])?;
    fdt.property_string("status", "okay")?;
    fdt.end_node(uart_node)?;

    let chosen_node = fdt.begin_node("chosen")?;
    fdt.property_string("bootargs", &config.cmdline)?;
    fdt.property_string("stdout-path", &format!("/{uart_node_name}"))?;
    fdt.end_node(chosen_node)?;

    fdt.end_node(root_node)?;

    Ok(fdt.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_generate_device_tree_with_default_config() {
        let dtb = generate_device_tree(&DeviceTreeConfig::default()).unwrap();

        // FDT magic number (0xd00dfeed)
        assert_eq!(dtb[0..4], [0xd0, 0x0d, 0xfe, 0xed]);
        assert!(contains(&dtb, LINFLEX_COMPATIBLE.as_bytes()));
        assert!(contains(&dtb, b"serial@401c8000"));
        assert!(contains(&dtb, b"/serial@401c8000"));
    }

    #[test]
    fn test_generate_device_tree_with_custom_uart() {
        let config = DeviceTreeConfig {
            uart: LinflexConfig {
                debug_name: "linflex1".to_string(),
                base: 0x401C_C000,
                irq: 83,
            },
            cmdline: "console=ttyLF1".to_string(),
            ..Default::default()
        };

        let dtb = generate_device_tree(&config).unwrap();
        assert_eq!(dtb[0..4], [0xd0, 0x0d, 0xfe, 0xed]);
        assert!(contains(&dtb, b"serial@401cc000"));
        assert!(contains(&dtb, b"console=ttyLF1"));
    }

    #[test]
    fn test_serial_node_name() {
        assert_eq!(
            serial_node_name(&LinflexConfig::default()),
            "serial@401c8000"
        );
    }
}
