//! The mDNS wire codec: a parser with name-compression pointer support, and a
//! writer with a name-compression table. Mirrors the shape of
//! `dandyvica-dnsquery`'s `ToFromNetworkOrder` read/write pair (`Vec<u8>` writer,
//! `Cursor`-like reader, `byteorder` for big-endian primitives) generalized
//! to mDNS's owned, cache-friendly record model.
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{DNSError, DNSResult};
use crate::name::Name;
use crate::record::{Question, Record, RecordClass, RecordData, RecordType};

pub const FLAG_QR: u16 = 0x8000;
pub const FLAG_AA: u16 = 0x0400;

pub const MAX_MSG_ABSOLUTE: usize = 8972;

const MAX_POINTER_OFFSET: u16 = 0x3FFF;

/// A fully parsed incoming mDNS message.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Incoming {
    pub fn is_query(&self) -> bool {
        self.flags & FLAG_QR == 0
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    /// Whether `candidate` is redundant with an answer already carried in
    /// this message (known-answer suppression).
    pub fn suppresses(&self, candidate: &Record) -> bool {
        self.answers.iter().any(|known| candidate.suppressed_by_answer(known))
    }

    /// ```
    /// use mdns_sd_node::codec::{Incoming, Outgoing, FLAG_QR};
    /// use mdns_sd_node::{Name, Record, RecordClass, RecordData};
    ///
    /// let mut out = Outgoing::new(FLAG_QR, true);
    /// out.add_answer(
    ///     Record::new(Name::new("_http._tcp.local."), RecordClass::IN, false, 120, 0,
    ///         RecordData::Ptr(Name::new("My Service._http._tcp.local."))),
    ///     None,
    /// );
    /// let packet = out.packet().unwrap();
    /// let parsed = Incoming::parse(&packet).unwrap();
    /// assert_eq!(parsed.answers.len(), 1);
    /// ```
    pub fn parse(data: &[u8]) -> DNSResult<Incoming> {
        let mut r = Reader::new(data);

        let id = r.read_u16()?;
        let flags = r.read_u16()?;
        let qd_count = r.read_u16()?;
        let an_count = r.read_u16()?;
        let ns_count = r.read_u16()?;
        let ar_count = r.read_u16()?;

        let mut questions = Vec::with_capacity(qd_count as usize);
        for _ in 0..qd_count {
            let name = r.read_name()?;
            let qtype = RecordType::from_u16(r.read_u16()?);
            let (qclass, _unique) = RecordClass::from_wire(r.read_u16()?);
            questions.push(Question::new(name, qtype, qclass));
        }

        let mut answers = Vec::with_capacity(an_count as usize);
        for _ in 0..an_count {
            answers.push(r.read_record()?);
        }

        let mut authorities = Vec::with_capacity(ns_count as usize);
        for _ in 0..ns_count {
            authorities.push(r.read_record()?);
        }

        let mut additionals = Vec::with_capacity(ar_count as usize);
        for _ in 0..ar_count {
            additionals.push(r.read_record()?);
        }

        Ok(Incoming { id, flags, questions, answers, authorities, additionals })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Stamped once at parse time and used as `created` for every record
    /// this packet yields.
    arrival_time: u64,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0, arrival_time: crate::time::now_millis() }
    }

    fn read_u8(&mut self) -> DNSResult<u8> {
        if self.pos >= self.data.len() {
            return Err(DNSError::MalformedPacket("truncated: expected a byte".into()));
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_u16(&mut self) -> DNSResult<u16> {
        if self.pos + 2 > self.data.len() {
            return Err(DNSError::MalformedPacket("truncated: expected a u16".into()));
        }
        let mut cur = std::io::Cursor::new(&self.data[self.pos..self.pos + 2]);
        self.pos += 2;
        cur.read_u16::<BigEndian>().map_err(DNSError::from)
    }

    fn read_u32(&mut self) -> DNSResult<u32> {
        if self.pos + 4 > self.data.len() {
            return Err(DNSError::MalformedPacket("truncated: expected a u32".into()));
        }
        let mut cur = std::io::Cursor::new(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        cur.read_u32::<BigEndian>().map_err(DNSError::from)
    }

    fn read_exact(&mut self, len: usize) -> DNSResult<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(DNSError::MalformedPacket(format!("truncated: expected {} bytes", len)));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads a domain name starting at the current cursor, following
    /// compression pointers (RFC 1035 §4.1.4). The first pointer encountered
    /// fixes the return offset for the outer cursor; every pointer jump must
    /// land strictly earlier in the message than the byte it was read from,
    /// which makes the walk provably finite and rejects any loop.
    fn read_name(&mut self) -> DNSResult<Name> {
        let mut labels: Vec<String> = Vec::new();
        let mut cur = self.pos;
        let mut return_pos: Option<usize> = None;

        loop {
            if cur >= self.data.len() {
                return Err(DNSError::MalformedPacket("name runs past end of packet".into()));
            }
            let b = self.data[cur];

            if b == 0 {
                if return_pos.is_none() {
                    return_pos = Some(cur + 1);
                }
                break;
            } else if b & 0xC0 == 0xC0 {
                if cur + 1 >= self.data.len() {
                    return Err(DNSError::MalformedPacket("truncated compression pointer".into()));
                }
                let offset = (((b as u16) & 0x3F) << 8) | self.data[cur + 1] as u16;
                if return_pos.is_none() {
                    return_pos = Some(cur + 2);
                }
                if offset as usize >= cur {
                    return Err(DNSError::MalformedPacket("compression pointer does not decrease (loop)".into()));
                }
                cur = offset as usize;
                continue;
            } else if b & 0xC0 != 0 {
                return Err(DNSError::MalformedPacket("reserved label length bits set".into()));
            } else {
                let len = b as usize;
                if len > 63 {
                    return Err(DNSError::NameTooLong);
                }
                if cur + 1 + len > self.data.len() {
                    return Err(DNSError::MalformedPacket("label runs past end of packet".into()));
                }
                let label = String::from_utf8_lossy(&self.data[cur + 1..cur + 1 + len]).into_owned();
                labels.push(label);
                cur += 1 + len;
            }
        }

        self.pos = return_pos.expect("loop always sets return_pos before breaking");

        let mut joined = labels.join(".");
        joined.push('.');
        Ok(Name::new(&joined))
    }

    fn read_record(&mut self) -> DNSResult<Record> {
        let name = self.read_name()?;
        let rtype = RecordType::from_u16(self.read_u16()?);
        let (class, unique) = RecordClass::from_wire(self.read_u16()?);
        let ttl = self.read_u32()?;
        let rdlength = self.read_u16()? as usize;
        let rdata_start = self.pos;

        let data = match rtype {
            RecordType::A => {
                let bytes = self.read_exact(4)?;
                RecordData::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            RecordType::AAAA => {
                let bytes = self.read_exact(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::PTR => RecordData::Ptr(self.read_name()?),
            RecordType::CNAME => RecordData::Cname(self.read_name()?),
            RecordType::TXT => RecordData::Txt(self.read_exact(rdlength)?.to_vec()),
            RecordType::SRV => {
                let priority = self.read_u16()?;
                let weight = self.read_u16()?;
                let port = self.read_u16()?;
                let target = self.read_name()?;
                RecordData::Srv { priority, weight, port, target }
            }
            RecordType::HINFO => {
                let cpu = self.read_character_string()?;
                let os = self.read_character_string()?;
                RecordData::Hinfo { cpu, os }
            }
            RecordType::ANY | RecordType::Unknown(_) => {
                let raw = self.read_exact(rdlength)?.to_vec();
                RecordData::Unknown { rtype: rtype.to_u16(), data: raw }
            }
        };

        // Unknown/variable-length records above may have consumed a
        // different number of bytes than rdlength claimed only if the
        // packet is malformed; resynchronize on the declared length so one
        // bad record doesn't desynchronize the rest of the message.
        let consumed = self.pos - rdata_start;
        if consumed > rdlength {
            return Err(DNSError::MalformedPacket("record payload longer than its rdlength".into()));
        } else if consumed < rdlength {
            self.pos += rdlength - consumed;
        }

        Ok(Record::new(name, class, unique, ttl, self.arrival_time, data))
    }

    fn read_character_string(&mut self) -> DNSResult<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_exact(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Builds one outgoing mDNS message: a header, questions, answers,
/// authorities and additionals, serialized once with a shared
/// name-compression table.
pub struct Outgoing {
    pub flags: u16,
    pub multicast: bool,
    id: u16,
    questions: Vec<Question>,
    answers: Vec<(Record, Option<u64>)>,
    authorities: Vec<Record>,
    additionals: Vec<Record>,
}

impl Outgoing {
    pub fn new(flags: u16, multicast: bool) -> Outgoing {
        Outgoing { flags, multicast, id: 0, questions: Vec::new(), answers: Vec::new(), authorities: Vec::new(), additionals: Vec::new() }
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn add_question(&mut self, q: Question) {
        self.questions.push(q);
    }

    /// Adds an answer. When `now` is `Some`, the emitted ttl reflects
    /// `record.get_remaining_ttl(now)` rather than the stored ttl, so a
    /// long-cached record's countdown is rewritten relative to send time.
    pub fn add_answer(&mut self, record: Record, now: Option<u64>) {
        self.answers.push((record, now.filter(|&n| n != 0)));
    }

    pub fn add_authority(&mut self, record: Record) {
        self.authorities.push(record);
    }

    pub fn add_additional(&mut self, record: Record) {
        self.additionals.push(record);
    }

    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty() && self.answers.is_empty() && self.authorities.is_empty() && self.additionals.is_empty()
    }

    pub fn packet(&self) -> DNSResult<Vec<u8>> {
        let mut w = Writer::new();

        for q in &self.questions {
            w.write_name(&q.name)?;
            w.buf.write_u16::<BigEndian>(q.qtype.to_u16())?;
            w.buf.write_u16::<BigEndian>(q.qclass.to_u16())?;
        }

        for (record, now) in &self.answers {
            w.write_record(record, *now, self.multicast)?;
        }
        for record in &self.authorities {
            w.write_record(record, None, self.multicast)?;
        }
        for record in &self.additionals {
            w.write_record(record, None, self.multicast)?;
        }

        // mDNS forces id=0 on multicast output; unicast replies echo the id
        // the caller set (the query's id).
        let id = if self.multicast { 0 } else { self.id };

        w.buf[0] = (id >> 8) as u8;
        w.buf[1] = id as u8;
        w.buf[2] = (self.flags >> 8) as u8;
        w.buf[3] = self.flags as u8;
        w.buf[4] = (self.questions.len() >> 8) as u8;
        w.buf[5] = self.questions.len() as u8;
        w.buf[6] = (self.answers.len() >> 8) as u8;
        w.buf[7] = self.answers.len() as u8;
        w.buf[8] = (self.authorities.len() >> 8) as u8;
        w.buf[9] = self.authorities.len() as u8;
        w.buf[10] = (self.additionals.len() >> 8) as u8;
        w.buf[11] = self.additionals.len() as u8;

        Ok(w.buf)
    }
}

struct Writer {
    buf: Vec<u8>,
    /// Offset (from the start of the message, header included) at which the
    /// full dotted lowercase name was previously written.
    name_offsets: HashMap<String, u16>,
}

impl Writer {
    fn new() -> Writer {
        // Reserve the 12 byte header; it is back-filled once the body is
        // known, but compression offsets are computed relative to the whole
        // message so the reservation must happen first.
        Writer { buf: vec![0u8; 12], name_offsets: HashMap::new() }
    }

    fn write_name(&mut self, name: &Name) -> DNSResult<()> {
        let key = name.key();

        if let Some(&offset) = self.name_offsets.get(&key) {
            let pointer = 0xC000u16 | offset;
            self.buf.write_u16::<BigEndian>(pointer)?;
            return Ok(());
        }

        let offset = self.buf.len();
        if offset <= MAX_POINTER_OFFSET as usize {
            self.name_offsets.insert(key, offset as u16);
        }

        for label in name.labels() {
            if label.len() > 63 {
                return Err(DNSError::NameTooLong);
            }
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label.as_bytes());
        }
        self.buf.push(0);

        Ok(())
    }

    fn write_record(&mut self, record: &Record, now: Option<u64>, multicast: bool) -> DNSResult<()> {
        self.write_name(&record.name)?;
        self.buf.write_u16::<BigEndian>(record.rtype().to_u16())?;
        self.buf.write_u16::<BigEndian>(record.class.to_wire(record.unique && multicast))?;

        let ttl = match now {
            Some(n) => record.get_remaining_ttl(n),
            None => record.ttl,
        };
        self.buf.write_u32::<BigEndian>(ttl)?;

        let rdlength_pos = self.buf.len();
        self.buf.write_u16::<BigEndian>(0)?; // placeholder

        let payload_start = self.buf.len();
        self.write_payload(&record.data)?;
        let payload_len = self.buf.len() - payload_start;

        self.buf[rdlength_pos] = (payload_len >> 8) as u8;
        self.buf[rdlength_pos + 1] = payload_len as u8;

        Ok(())
    }

    fn write_payload(&mut self, data: &RecordData) -> DNSResult<()> {
        match data {
            RecordData::A(addr) => self.buf.extend_from_slice(&addr.octets()),
            RecordData::Aaaa(addr) => self.buf.extend_from_slice(&addr.octets()),
            RecordData::Ptr(name) | RecordData::Cname(name) => self.write_name(name)?,
            RecordData::Txt(bytes) => self.buf.extend_from_slice(bytes),
            RecordData::Srv { priority, weight, port, target } => {
                self.buf.write_u16::<BigEndian>(*priority)?;
                self.buf.write_u16::<BigEndian>(*weight)?;
                self.buf.write_u16::<BigEndian>(*port)?;
                self.write_name(target)?;
            }
            RecordData::Hinfo { cpu, os } => {
                self.write_character_string(cpu)?;
                self.write_character_string(os)?;
            }
            RecordData::Unknown { data, .. } => self.buf.extend_from_slice(data),
        }
        Ok(())
    }

    fn write_character_string(&mut self, s: &str) -> DNSResult<()> {
        if s.len() > 255 {
            return Err(DNSError::MalformedPacket("character-string longer than 255 bytes".into()));
        }
        self.buf.push(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    fn ptr_record(name: &str, target: &str, ttl: u32) -> Record {
        Record::new(Name::new(name), RecordClass::IN, false, ttl, 0, RecordData::Ptr(Name::new(target)))
    }

    #[test]
    fn round_trip_question_and_answer() {
        let mut out = Outgoing::new(FLAG_QR | FLAG_AA, true);
        out.add_question(Question::new(Name::new("_http._tcp.local."), RecordType::PTR, RecordClass::IN));
        out.add_answer(ptr_record("_http._tcp.local.", "My Service._http._tcp.local.", 120), None);

        let packet = out.packet().expect("serializes");
        let parsed = Incoming::parse(&packet).expect("parses back");

        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.answers.len(), 1);
        assert_eq!(parsed.questions[0].name, Name::new("_http._tcp.local."));
        assert!(parsed.answers[0].matches(&ptr_record("_http._tcp.local.", "My Service._http._tcp.local.", 1)));
    }

    #[test]
    fn repeated_name_compresses_to_two_bytes() {
        let mut out = Outgoing::new(FLAG_QR | FLAG_AA, true);
        out.add_answer(ptr_record("_http._tcp.local.", "a._http._tcp.local.", 10), None);
        out.add_answer(ptr_record("_http._tcp.local.", "b._http._tcp.local.", 10), None);

        let packet = out.packet().unwrap();

        // Locate the second occurrence of the owner name's first label
        // length byte sequence and confirm it was replaced by a 2-byte
        // pointer rather than the full label sequence.
        let needle = [0xC0u8]; // pointer marker high bits
        let pointer_count = packet.windows(1).filter(|w| w[0] & 0xC0 == 0xC0).count();
        assert!(pointer_count >= 1, "expected at least one compression pointer, found none in {:?}", needle);

        let parsed = Incoming::parse(&packet).unwrap();
        assert_eq!(parsed.answers.len(), 2);
        assert_eq!(parsed.answers[0].name, Name::new("_http._tcp.local."));
        assert_eq!(parsed.answers[1].name, Name::new("_http._tcp.local."));
    }

    #[test]
    fn unknown_record_type_is_skipped_not_fatal() {
        let mut out = Outgoing::new(FLAG_QR, true);
        out.add_answer(
            Record::new(Name::new("x.local."), RecordClass::IN, false, 5, 0, RecordData::Unknown { rtype: 999, data: vec![1, 2, 3, 4] }),
            None,
        );
        let packet = out.packet().unwrap();
        let parsed = Incoming::parse(&packet).unwrap();
        assert_eq!(parsed.answers.len(), 1);
        assert!(matches!(parsed.answers[0].data, RecordData::Unknown { rtype: 999, .. }));
    }

    #[test]
    fn circular_pointer_is_rejected() {
        // header (12 bytes) then a name at offset 12 that is just a pointer
        // back to itself: 0xC0 0x0C -> offset 12, which is not < 12.
        let mut packet = vec![0u8; 12];
        packet[4] = 0; // qdcount stays 0, we'll parse manually via read_name through a question instead
        packet.extend_from_slice(&[0xC0, 0x0C]);
        packet[4] = 0x00;
        packet[5] = 0x01;
        packet.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // qtype/qclass
        let err = Incoming::parse(&packet).unwrap_err();
        assert!(matches!(err, DNSError::MalformedPacket(_)));
    }

    #[test]
    fn label_over_63_bytes_rejected_on_write() {
        let long_label = "a".repeat(64);
        let name = Name::new(&format!("{}.local.", long_label));
        let mut out = Outgoing::new(0, true);
        out.add_answer(ptr_record("x.local.", "y.local.", 1), None);
        out.add_question(Question::new(name, RecordType::A, RecordClass::IN));
        assert!(matches!(out.packet(), Err(DNSError::NameTooLong)));
    }

    #[test]
    fn label_of_63_bytes_is_accepted() {
        let label = "a".repeat(63);
        let name = Name::new(&format!("{}.local.", label));
        let mut out = Outgoing::new(0, true);
        out.add_question(Question::new(name, RecordType::A, RecordClass::IN));
        assert!(out.packet().is_ok());
    }
}
