use std::convert::TryFrom;
use std::fmt;

/// The exhaustive instruction set of the RT-Micro-C stack machine.
///
/// Every variant corresponds to exactly one opcode byte written into a
/// `.vmb` image. Discriminants are stable once assigned: changing one
/// would break any bytecode image produced by a prior compiler version.
///
/// ## Control
///
/// `JUMP`/`JUMPIF_TRUE`/`JUMPIF_FALSE` carry a single operand: the target
/// instruction index. `CALL` carries `(function_id, argc)`. `RET` and
/// `HALT` carry no operands.
///
/// ## Data / Memory / Arithmetic
///
/// These operate purely on the VM's operand stack and frame storage; the
/// compiler never inspects their runtime effect, only their arity.
///
/// ## RTOS / Hardware / Messaging / Debug
///
/// These lower 1:1 from the source-level intrinsics of the same name and
/// are otherwise opaque to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum Opcode {
    // --- Control ---
    Jump = 0x00,
    JumpIfTrue = 0x01,
    JumpIfFalse = 0x02,
    Call = 0x03,
    Ret = 0x04,
    Halt = 0x05,
    Nop = 0x06,
    Comment = 0x07,

    // --- Data ---
    LoadConst = 0x10,
    LoadVar = 0x11,
    StoreVar = 0x12,
    LoadStructMember = 0x13,
    StoreStructMember = 0x14,
    LoadStructMemberBit = 0x15,
    StoreStructMemberBit = 0x16,
    LoadAddr = 0x17,
    LoadDeref = 0x18,
    StoreDeref = 0x19,
    Pop = 0x1a,

    // --- Memory ---
    AllocVar = 0x20,
    FreeVar = 0x21,
    AllocStruct = 0x22,
    AllocFrame = 0x23,
    FreeFrame = 0x24,
    AllocArray = 0x25,
    LoadArrayElem = 0x26,
    StoreArrayElem = 0x27,
    GlobalVarDeclare = 0x28,

    // --- Arithmetic / logic ---
    Add = 0x30,
    Sub = 0x31,
    Mul = 0x32,
    Div = 0x33,
    Mod = 0x34,
    And = 0x35,
    Or = 0x36,
    Not = 0x37,
    Xor = 0x38,
    Eq = 0x39,
    Neq = 0x3a,
    Lt = 0x3b,
    Lte = 0x3c,
    Gt = 0x3d,
    Gte = 0x3e,
    Shl = 0x3f,

    // --- RTOS ---
    RtosCreateTask = 0x40,
    RtosDeleteTask = 0x41,
    RtosDelayMs = 0x42,
    RtosYield = 0x43,
    RtosSuspendTask = 0x44,
    RtosResumeTask = 0x45,
    RtosSemaphoreCreate = 0x46,
    RtosSemaphoreTake = 0x47,
    RtosSemaphoreGive = 0x48,

    // --- Messaging ---
    MsgDeclare = 0x50,
    MsgSend = 0x51,
    MsgRecv = 0x52,
    Shr = 0x5f,

    // --- Hardware ---
    HwGpioInit = 0x60,
    HwGpioSet = 0x61,
    HwGpioGet = 0x62,
    HwTimerInit = 0x63,
    HwTimerStart = 0x64,
    HwTimerStop = 0x65,
    HwTimerSetPwmDuty = 0x66,
    HwAdcInit = 0x67,
    HwAdcRead = 0x68,
    HwUartWrite = 0x69,
    HwSpiTransfer = 0x6a,
    HwI2cWrite = 0x6b,
    HwI2cRead = 0x6c,

    // --- Debug ---
    Print = 0x70,
    Printf = 0x71,
    DbgBreakpoint = 0x72,
    Syscall = 0x73,
}

impl Opcode {
    /// Mnemonic used by `--tokens`/`--ast` dumps and in diagnostics; also
    /// the identifier recognized by the (out of scope) VM disassembler.
    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Jump => "JUMP",
            JumpIfTrue => "JUMPIF_TRUE",
            JumpIfFalse => "JUMPIF_FALSE",
            Call => "CALL",
            Ret => "RET",
            Halt => "HALT",
            Nop => "NOP",
            Comment => "COMMENT",
            LoadConst => "LOAD_CONST",
            LoadVar => "LOAD_VAR",
            StoreVar => "STORE_VAR",
            LoadStructMember => "LOAD_STRUCT_MEMBER",
            StoreStructMember => "STORE_STRUCT_MEMBER",
            LoadStructMemberBit => "LOAD_STRUCT_MEMBER_BIT",
            StoreStructMemberBit => "STORE_STRUCT_MEMBER_BIT",
            LoadAddr => "LOAD_ADDR",
            LoadDeref => "LOAD_DEREF",
            StoreDeref => "STORE_DEREF",
            Pop => "POP",
            AllocVar => "ALLOC_VAR",
            FreeVar => "FREE_VAR",
            AllocStruct => "ALLOC_STRUCT",
            AllocFrame => "ALLOC_FRAME",
            FreeFrame => "FREE_FRAME",
            AllocArray => "ALLOC_ARRAY",
            LoadArrayElem => "LOAD_ARRAY_ELEM",
            StoreArrayElem => "STORE_ARRAY_ELEM",
            GlobalVarDeclare => "GLOBAL_VAR_DECLARE",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            And => "AND",
            Or => "OR",
            Not => "NOT",
            Xor => "XOR",
            Eq => "EQ",
            Neq => "NEQ",
            Lt => "LT",
            Lte => "LTE",
            Gt => "GT",
            Gte => "GTE",
            Shl => "SHL",
            Shr => "SHR",
            RtosCreateTask => "RTOS_CREATE_TASK",
            RtosDeleteTask => "RTOS_DELETE_TASK",
            RtosDelayMs => "RTOS_DELAY_MS",
            RtosYield => "RTOS_YIELD",
            RtosSuspendTask => "RTOS_SUSPEND_TASK",
            RtosResumeTask => "RTOS_RESUME_TASK",
            RtosSemaphoreCreate => "RTOS_SEMAPHORE_CREATE",
            RtosSemaphoreTake => "RTOS_SEMAPHORE_TAKE",
            RtosSemaphoreGive => "RTOS_SEMAPHORE_GIVE",
            MsgDeclare => "MSG_DECLARE",
            MsgSend => "MSG_SEND",
            MsgRecv => "MSG_RECV",
            HwGpioInit => "HW_GPIO_INIT",
            HwGpioSet => "HW_GPIO_SET",
            HwGpioGet => "HW_GPIO_GET",
            HwTimerInit => "HW_TIMER_INIT",
            HwTimerStart => "HW_TIMER_START",
            HwTimerStop => "HW_TIMER_STOP",
            HwTimerSetPwmDuty => "HW_TIMER_SET_PWM_DUTY",
            HwAdcInit => "HW_ADC_INIT",
            HwAdcRead => "HW_ADC_READ",
            HwUartWrite => "HW_UART_WRITE",
            HwSpiTransfer => "HW_SPI_TRANSFER",
            HwI2cWrite => "HW_I2C_WRITE",
            HwI2cRead => "HW_I2C_READ",
            Print => "PRINT",
            Printf => "PRINTF",
            DbgBreakpoint => "DBG_BREAKPOINT",
            Syscall => "SYSCALL",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Error returned by [`TryFrom<u8>`] when a byte does not name a known
/// opcode. Distinct from the compiler's own `CompileError` family since it
/// only ever arises when *reading back* an image, not while compiling one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownOpcode(pub u8);

impl fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown opcode byte 0x{:02x}", self.0)
    }
}

impl std::error::Error for UnknownOpcode {}

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match b {
            0x00 => Jump,
            0x01 => JumpIfTrue,
            0x02 => JumpIfFalse,
            0x03 => Call,
            0x04 => Ret,
            0x05 => Halt,
            0x06 => Nop,
            0x07 => Comment,
            0x10 => LoadConst,
            0x11 => LoadVar,
            0x12 => StoreVar,
            0x13 => LoadStructMember,
            0x14 => StoreStructMember,
            0x15 => LoadStructMemberBit,
            0x16 => StoreStructMemberBit,
            0x17 => LoadAddr,
            0x18 => LoadDeref,
            0x19 => StoreDeref,
            0x1a => Pop,
            0x20 => AllocVar,
            0x21 => FreeVar,
            0x22 => AllocStruct,
            0x23 => AllocFrame,
            0x24 => FreeFrame,
            0x25 => AllocArray,
            0x26 => LoadArrayElem,
            0x27 => StoreArrayElem,
            0x28 => GlobalVarDeclare,
            0x30 => Add,
            0x31 => Sub,
            0x32 => Mul,
            0x33 => Div,
            0x34 => Mod,
            0x35 => And,
            0x36 => Or,
            0x37 => Not,
            0x38 => Xor,
            0x39 => Eq,
            0x3a => Neq,
            0x3b => Lt,
            0x3c => Lte,
            0x3d => Gt,
            0x3e => Gte,
            0x3f => Shl,
            0x40 => RtosCreateTask,
            0x41 => RtosDeleteTask,
            0x42 => RtosDelayMs,
            0x43 => RtosYield,
            0x44 => RtosSuspendTask,
            0x45 => RtosResumeTask,
            0x46 => RtosSemaphoreCreate,
            0x47 => RtosSemaphoreTake,
            0x48 => RtosSemaphoreGive,
            0x50 => MsgDeclare,
            0x51 => MsgSend,
            0x52 => MsgRecv,
            0x5f => Shr,
            0x60 => HwGpioInit,
            0x61 => HwGpioSet,
            0x62 => HwGpioGet,
            0x63 => HwTimerInit,
            0x64 => HwTimerStart,
            0x65 => HwTimerStop,
            0x66 => HwTimerSetPwmDuty,
            0x67 => HwAdcInit,
            0x68 => HwAdcRead,
            0x69 => HwUartWrite,
            0x6a => HwSpiTransfer,
            0x6b => HwI2cWrite,
            0x6c => HwI2cRead,
            0x70 => Print,
            0x71 => Printf,
            0x72 => DbgBreakpoint,
            0x73 => Syscall,
            other => return Err(UnknownOpcode(other)),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

/// The reserved source-level intrinsic names, each lowered
/// directly to a dedicated opcode rather than a `CALL`.
pub const INTRINSIC_NAMES: &[&str] = &[
    "StartTask",
    "RTOS_DELAY_MS",
    "RTOS_YIELD",
    "RTOS_SUSPEND_TASK",
    "RTOS_RESUME_TASK",
    "RTOS_SEMAPHORE_CREATE",
    "RTOS_SEMAPHORE_TAKE",
    "RTOS_SEMAPHORE_GIVE",
    "HW_GPIO_INIT",
    "HW_GPIO_SET",
    "HW_GPIO_GET",
    "HW_ADC_INIT",
    "HW_ADC_READ",
    "HW_TIMER_INIT",
    "HW_TIMER_START",
    "HW_TIMER_STOP",
    "HW_TIMER_SET_PWM_DUTY",
    "HW_UART_WRITE",
    "HW_SPI_TRANSFER",
    "HW_I2C_WRITE",
    "HW_I2C_READ",
    "DBG_PRINT",
    "DBG_PRINTF",
    "DBG_BREAKPOINT",
    "sizeof",
];

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcode_byte_round_trip() {
        for op in Opcode::iter() {
            let byte: u8 = op.into();
            assert_eq!(Opcode::try_from(byte).unwrap(), op);
        }
    }

    #[test]
    fn unknown_byte_rejected() {
        assert!(Opcode::try_from(0xff).is_err());
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::iter() {
            assert!(seen.insert(op.mnemonic()), "duplicate mnemonic for {op:?}");
        }
    }
}
