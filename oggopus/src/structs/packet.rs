//! Logical packets carried by an Ogg stream.

/// One codec packet, opaque to the container.
///
/// On the mux side the caller fills every field; on the demux side the
/// granule position is that of the page on which the packet completed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Sample position of the last sample this packet completes.
    pub granule_position: i64,
    /// Position of the packet within its stream, starting at 0.
    pub packet_no: u64,
    pub bos: bool,
    pub eos: bool,
    /// Serial of the stream the packet was read from. Ignored when muxing.
    pub serial: u32,
    /// Last packet completed on its page, so `granule_position` is exact.
    pub last_on_page: bool,
}

impl Packet {
    pub fn new(data: Vec<u8>, granule_position: i64, packet_no: u64) -> Self {
        Self {
            data,
            granule_position,
            packet_no,
            bos: packet_no == 0,
            eos: false,
            serial: 0,
            last_on_page: false,
        }
    }

    pub fn with_eos(mut self, eos: bool) -> Self {
        self.eos = eos;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
