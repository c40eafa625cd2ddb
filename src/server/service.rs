use std::{
    future,
    sync::{Arc, Mutex},
};

use tokio_modbus::prelude::{Exception, Request, Response};

use crate::storage::SlaveStorage;

/// Modbus service answering every request out of a shared [`SlaveStorage`].
///
/// Each request's function code and address range is routed to a block
/// operation on the matching data table, so register traffic is observable
/// through the storage's notification hub. Reads never raise
/// IllegalDataAddress: the sparse stores default unwritten addresses, which
/// makes the whole 16-bit address space readable.
///
/// The mutex is the external serialization layer required around the
/// single-owner storage; one request is processed at a time.
#[derive(Clone)]
pub struct StorageService {
    storage: Arc<Mutex<SlaveStorage>>,
}

impl StorageService {
    pub fn new(storage: Arc<Mutex<SlaveStorage>>) -> Self {
        Self { storage }
    }
}

impl tokio_modbus::server::Service for StorageService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = Exception;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let mut storage = self.storage.lock().unwrap();
        let res = match req {
            Request::ReadCoils(addr, cnt) => {
                Ok(Response::ReadCoils(storage.coils.read_block(addr, cnt)))
            }
            Request::ReadDiscreteInputs(addr, cnt) => Ok(Response::ReadDiscreteInputs(
                storage.discretes.read_block(addr, cnt),
            )),
            Request::ReadHoldingRegisters(addr, cnt) => Ok(Response::ReadHoldingRegisters(
                storage.holdings.read_block(addr, cnt),
            )),
            Request::ReadInputRegisters(addr, cnt) => Ok(Response::ReadInputRegisters(
                storage.inputs.read_block(addr, cnt),
            )),
            Request::WriteSingleCoil(addr, value) => {
                storage.coils.write_block(addr, &[value]);
                Ok(Response::WriteSingleCoil(addr, value))
            }
            Request::WriteSingleRegister(addr, value) => {
                storage.holdings.write_block(addr, &[value]);
                Ok(Response::WriteSingleRegister(addr, value))
            }
            Request::WriteMultipleCoils(addr, values) => {
                storage.coils.write_block(addr, &values);
                Ok(Response::WriteMultipleCoils(addr, values.len() as u16))
            }
            Request::WriteMultipleRegisters(addr, values) => {
                storage.holdings.write_block(addr, &values);
                Ok(Response::WriteMultipleRegisters(addr, values.len() as u16))
            }
            other => {
                log::warn!("Unsupported Modbus function in request: {other:?}");
                Err(Exception::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterType;
    use crate::storage::OperationKind;
    use tokio_modbus::server::Service;

    fn service_with_hub() -> (StorageService, flume::Receiver<crate::storage::StorageNotification>)
    {
        let mut storage = SlaveStorage::new();
        let hub = storage.attach_hub();
        (StorageService::new(Arc::new(Mutex::new(storage))), hub)
    }

    #[test]
    fn test_read_unwritten_holdings_returns_zeros() {
        let (service, _hub) = service_with_hub();

        let response = tokio_test::block_on(service.call(Request::ReadHoldingRegisters(40_000, 4)))
            .unwrap();

        assert_eq!(response, Response::ReadHoldingRegisters(vec![0, 0, 0, 0]));
    }

    #[test]
    fn test_write_multiple_then_read_back() {
        let (service, hub) = service_with_hub();

        let write = tokio_test::block_on(
            service.call(Request::WriteMultipleRegisters(16, vec![100, 200, 300].into())),
        )
        .unwrap();
        assert_eq!(write, Response::WriteMultipleRegisters(16, 3));

        let read =
            tokio_test::block_on(service.call(Request::ReadHoldingRegisters(16, 3))).unwrap();
        assert_eq!(read, Response::ReadHoldingRegisters(vec![100, 200, 300]));

        let first = hub.try_recv().unwrap();
        assert_eq!(first.table, RegisterType::Holding);
        assert_eq!(first.kind, OperationKind::Write);
        assert_eq!(first.start_address, 16);
        assert_eq!(first.values, vec![100, 200, 300]);

        let second = hub.try_recv().unwrap();
        assert_eq!(second.kind, OperationKind::Read);
    }

    #[test]
    fn test_single_coil_write_echoes_and_lands() {
        let (service, hub) = service_with_hub();

        let response =
            tokio_test::block_on(service.call(Request::WriteSingleCoil(3, true))).unwrap();
        assert_eq!(response, Response::WriteSingleCoil(3, true));

        let read = tokio_test::block_on(service.call(Request::ReadCoils(0, 5))).unwrap();
        assert_eq!(
            read,
            Response::ReadCoils(vec![false, false, false, true, false])
        );

        let event = hub.try_recv().unwrap();
        assert_eq!(event.table, RegisterType::Coils);
        assert_eq!(event.values, vec![1]);
    }

    #[test]
    fn test_unsupported_function_answers_illegal_function() {
        let (service, _hub) = service_with_hub();

        let result = tokio_test::block_on(service.call(Request::MaskWriteRegister(0, 0, 0)));

        assert_eq!(result, Err(Exception::IllegalFunction));
    }
}
