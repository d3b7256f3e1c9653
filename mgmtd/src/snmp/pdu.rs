//! SNMPv1/v2c messages and PDUs.

use bytes::{Bytes, BytesMut};

use super::ber::*;
use super::oid::Oid;

const PDU_GET: u8 = 0xa0;
const PDU_GET_NEXT: u8 = 0xa1;
const PDU_RESPONSE: u8 = 0xa2;
const PDU_SET: u8 = 0xa3;
const PDU_GET_BULK: u8 = 0xa5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2c,
}

impl Version {
    fn code(self) -> i64 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    Get,
    GetNext,
    Response,
    Set,
    GetBulk,
}

impl PduType {
    fn tag(self) -> u8 {
        match self {
            PduType::Get => PDU_GET,
            PduType::GetNext => PDU_GET_NEXT,
            PduType::Response => PDU_RESPONSE,
            PduType::Set => PDU_SET,
            PduType::GetBulk => PDU_GET_BULK,
        }
    }

    fn from_tag(tag: u8) -> BerResult<Self> {
        Ok(match tag {
            PDU_GET => PduType::Get,
            PDU_GET_NEXT => PduType::GetNext,
            PDU_RESPONSE => PduType::Response,
            PDU_SET => PduType::Set,
            PDU_GET_BULK => PduType::GetBulk,
            other => return Err(BerError::DecodeError(format!("unsupported PDU type 0x{:02x}", other))),
        })
    }
}

/// SNMP error-status values (RFC 3416).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError = 0,
    TooBig = 1,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GenErr = 5,
    NoAccess = 6,
    WrongType = 7,
    WrongLength = 8,
    WrongEncoding = 9,
    WrongValue = 10,
    NoCreation = 11,
    InconsistentValue = 12,
    ResourceUnavailable = 13,
    CommitFailed = 14,
    UndoFailed = 15,
    AuthorizationError = 16,
    NotWritable = 17,
    InconsistentName = 18,
}

impl ErrorStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// SNMPv1 equivalent (RFC 2576 section 4.3).
    pub fn to_v1(self) -> ErrorStatus {
        use ErrorStatus::*;
        match self {
            NoError | TooBig | NoSuchName | BadValue | ReadOnly | GenErr => self,
            WrongValue | WrongEncoding | WrongType | WrongLength | InconsistentValue => BadValue,
            NoAccess | NotWritable | NoCreation | InconsistentName | AuthorizationError => NoSuchName,
            ResourceUnavailable | CommitFailed | UndoFailed => GenErr,
        }
    }
}

/// A variable binding value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::OctetString(s.as_bytes().to_vec())
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView)
    }

    fn decode(tag: u8, content: &[u8]) -> BerResult<Self> {
        let narrow = |v: u64| u32::try_from(v).map_err(|_| BerError::IntegerOverflow);
        Ok(match tag {
            TAG_INTEGER => Value::Integer(decode_integer(content)?),
            TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
            TAG_NULL => Value::Null,
            TAG_OID => Value::ObjectId(decode_oid(content)?),
            TAG_IP_ADDRESS => {
                let octets: [u8; 4] = content
                    .try_into()
                    .map_err(|_| BerError::DecodeError("IpAddress must be 4 octets".into()))?;
                Value::IpAddress(octets)
            }
            TAG_COUNTER32 => Value::Counter32(narrow(decode_unsigned(content)?)?),
            TAG_GAUGE32 => Value::Gauge32(narrow(decode_unsigned(content)?)?),
            TAG_TIMETICKS => Value::TimeTicks(narrow(decode_unsigned(content)?)?),
            TAG_OPAQUE => Value::Opaque(content.to_vec()),
            TAG_COUNTER64 => Value::Counter64(decode_unsigned(content)?),
            TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
            other => return Err(BerError::DecodeError(format!("unsupported value type 0x{:02x}", other))),
        })
    }

    fn encode(&self, out: &mut BytesMut) {
        match self {
            Value::Integer(v) => put_tlv(out, TAG_INTEGER, &encode_integer(*v)),
            Value::OctetString(s) => put_tlv(out, TAG_OCTET_STRING, s),
            Value::Null => put_tlv(out, TAG_NULL, &[]),
            Value::ObjectId(oid) => put_tlv(out, TAG_OID, &encode_oid(oid)),
            Value::IpAddress(ip) => put_tlv(out, TAG_IP_ADDRESS, ip),
            Value::Counter32(v) => put_tlv(out, TAG_COUNTER32, &encode_unsigned(*v as u64)),
            Value::Gauge32(v) => put_tlv(out, TAG_GAUGE32, &encode_unsigned(*v as u64)),
            Value::TimeTicks(v) => put_tlv(out, TAG_TIMETICKS, &encode_unsigned(*v as u64)),
            Value::Opaque(s) => put_tlv(out, TAG_OPAQUE, s),
            Value::Counter64(v) => put_tlv(out, TAG_COUNTER64, &encode_unsigned(*v)),
            Value::NoSuchObject => put_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => put_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => put_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }
}

/// A PDU. For GetBulk, `error_status` carries non-repeaters and
/// `error_index` carries max-repetitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i64,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn non_repeaters(&self) -> i64 {
        self.error_status
    }

    pub fn max_repetitions(&self) -> i64 {
        self.error_index
    }

    /// Response to `request` with the given bindings and no error.
    pub fn response(request_id: i64, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Error response; `index` is 1-based, 0 when no binding is at fault.
    pub fn error(request_id: i64, status: ErrorStatus, index: usize, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status: status.code(),
            error_index: index as i64,
            varbinds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: Version,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    pub fn decode(data: &[u8]) -> BerResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut msg = expect_tlv(&mut buf, TAG_SEQUENCE)?;

        let version = match decode_integer(&expect_tlv(&mut msg, TAG_INTEGER)?)? {
            0 => Version::V1,
            1 => Version::V2c,
            v => return Err(BerError::DecodeError(format!("unsupported SNMP version {}", v))),
        };
        let community = expect_tlv(&mut msg, TAG_OCTET_STRING)?.to_vec();

        let (tag, mut body) = read_tlv(&mut msg)?;
        let pdu_type = PduType::from_tag(tag)?;
        let request_id = decode_integer(&expect_tlv(&mut body, TAG_INTEGER)?)?;
        let error_status = decode_integer(&expect_tlv(&mut body, TAG_INTEGER)?)?;
        let error_index = decode_integer(&expect_tlv(&mut body, TAG_INTEGER)?)?;

        let mut list = expect_tlv(&mut body, TAG_SEQUENCE)?;
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut vb = expect_tlv(&mut list, TAG_SEQUENCE)?;
            let oid = decode_oid(&expect_tlv(&mut vb, TAG_OID)?)?;
            let (tag, content) = read_tlv(&mut vb)?;
            varbinds.push(VarBind {
                oid,
                value: Value::decode(tag, &content)?,
            });
        }

        Ok(Message {
            version,
            community,
            pdu: Pdu {
                pdu_type,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut list = BytesMut::new();
        for vb in &self.pdu.varbinds {
            let mut inner = BytesMut::new();
            put_tlv(&mut inner, TAG_OID, &encode_oid(&vb.oid));
            vb.value.encode(&mut inner);
            put_tlv(&mut list, TAG_SEQUENCE, &inner);
        }

        let mut pdu = BytesMut::new();
        put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.request_id));
        put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_status));
        put_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_index));
        put_tlv(&mut pdu, TAG_SEQUENCE, &list);

        let mut msg = BytesMut::new();
        put_tlv(&mut msg, TAG_INTEGER, &encode_integer(self.version.code()));
        put_tlv(&mut msg, TAG_OCTET_STRING, &self.community);
        put_tlv(&mut msg, self.pdu.pdu_type.tag(), &pdu);

        let mut out = BytesMut::with_capacity(msg.len() + 4);
        put_tlv(&mut out, TAG_SEQUENCE, &msg);
        out.freeze()
    }
}
