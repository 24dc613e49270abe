
/// Configuration for the X-MAC
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    /// Duty cycle length in milliseconds (sleep plus carrier sense)
    pub cycle_length_ms: u32,

    /// Simulation steps per second
    pub steps_per_second: u32,

    /// Radio bit rate
    pub bits_per_second: u32,

    /// RTS frame length in bits
    pub rts_bits: u32,
    /// CTS frame length in bits
    pub cts_bits: u32,
    /// ACK frame length in bits
    pub ack_bits: u32,
    /// DATA frame length in bits (header and maximum payload)
    pub data_bits: u32,

    /// Header length in bits, stamped into every frame
    pub header_bits: u16,

    /// Margin added to every wait-for-completion timeout, in steps
    pub transmission_margin: u64,

    /// Extra listening time on top of a full preamble period, in steps
    pub carrier_sense_margin: u64,

    /// Request acknowledgement of unicast DATA frames
    pub ack_required: bool,

    /// Number of attempts for each outgoing DATA frame
    pub max_data_retries: u16,

    /// Number of backoffs when the channel is busy at the start of a send
    pub max_backoff_retries: u8,

    /// Transmit power in dBm
    pub tx_power_dbm: i16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_length_ms: 100,
            steps_per_second: 1_000_000,
            bits_per_second: 250_000,

            rts_bits: 120,
            cts_bits: 120,
            ack_bits: 88,
            data_bits: 1024,
            header_bits: 72,

            transmission_margin: 100,
            carrier_sense_margin: 100,

            ack_required: true,
            max_data_retries: 3,
            max_backoff_retries: 3,

            tx_power_dbm: 0,
        }
    }
}
