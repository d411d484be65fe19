use std::env;

fn main() {
    // CPU frequency for baud rate and timing calculations
    println!("cargo:rerun-if-env-changed=F_CPU");
    let f_cpu = env::var("F_CPU").unwrap_or_else(|_| String::from("16000000"));
    if f_cpu.parse::<u32>().is_err() {
        panic!("F_CPU must be a frequency in Hz, got `{}`", f_cpu);
    }
    println!("cargo:rustc-env=MCU_FREQ_HZ={}", f_cpu);

    // Host builds use the register mock-up, only the AVR target links for the part
    let target = env::var("TARGET").unwrap();
    if target.contains("avr") {
        println!("cargo:rustc-link-arg=-mmcu=atmega328p");
        println!("cargo:warning=Building for ATmega328P at {}Hz", f_cpu);
    }
}
