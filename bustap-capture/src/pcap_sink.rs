use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bustap_core::{CaptureError, Record, RecordSink};
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use pcap_file::{DataLink, TsResolution};
use tracing::{debug, info};

/// Largest message the D-Bus specification allows.
pub const MAX_DBUS_MESSAGE: u32 = 1 << 27;

/// Link-layer type written to the global header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    /// No particular encapsulation.
    #[default]
    Null,
    /// LINKTYPE_DBUS (231).
    Dbus,
}

impl From<LinkType> for DataLink {
    fn from(link: LinkType) -> Self {
        match link {
            LinkType::Null => DataLink::NULL,
            LinkType::Dbus => DataLink::DBUS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PcapSinkOptions {
    pub link_type: LinkType,
    pub snaplen: u32,
}

impl Default for PcapSinkOptions {
    fn default() -> Self {
        Self {
            link_type: LinkType::Null,
            snaplen: MAX_DBUS_MESSAGE,
        }
    }
}

/// Buffered pcap writer with microsecond timestamps.
///
/// Records are buffered; [`RecordSink::close`] flushes. A failed append
/// leaves the file with a partial record and the sink must not be used
/// again.
pub struct PcapSink {
    path: PathBuf,
    writer: PcapWriter<BufWriter<File>>,
}

impl PcapSink {
    /// Creates (or truncates) `path` and writes the global header.
    pub fn create<P: AsRef<Path>>(path: P, options: PcapSinkOptions) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            CaptureError::setup(&format!("Couldn't open pcap dump {}", path.display()), e)
        })?;

        let header = PcapHeader {
            snaplen: options.snaplen,
            datalink: options.link_type.into(),
            ts_resolution: TsResolution::MicroSecond,
            ..Default::default()
        };
        let writer = PcapWriter::with_header(BufWriter::new(file), header).map_err(|e| {
            CaptureError::setup(&format!("Couldn't write pcap header to {}", path.display()), e)
        })?;

        info!("Capturing to {} ({:?})", path.display(), options.link_type);
        Ok(Self { path, writer })
    }
}

impl RecordSink for PcapSink {
    fn append(&mut self, record: &Record) -> Result<(), CaptureError> {
        let len = u32::try_from(record.len())
            .map_err(|_| CaptureError::SinkWrite(format!("record of {} bytes", record.len())))?;
        let packet = PcapPacket::new(record.since_epoch(), len, record.payload());
        self.writer
            .write_packet(&packet)
            .map_err(|e| CaptureError::SinkWrite(e.to_string()))?;
        Ok(())
    }

    fn close(self) -> Result<(), CaptureError> {
        let mut file = self.writer.into_writer();
        file.flush()
            .map_err(|e| CaptureError::SinkWrite(e.to_string()))?;
        debug!("Closed {}", self.path.display());
        Ok(())
    }
}
